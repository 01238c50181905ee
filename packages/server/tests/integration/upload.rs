use serde_json::json;

use crate::common::{HEADER, TestApp, roster, routes};

mod start {
    use super::*;

    #[tokio::test]
    async fn accepted_upload_returns_endpoints() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;

        let res = app
            .upload_with_token(
                "roster.csv",
                "text/csv",
                roster(&["A1,Ada,Lovelace,7B,Year 7,ada.parent@example.com"]),
                &token,
            )
            .await;

        assert_eq!(res.status, 202, "{}", res.text);
        assert_eq!(res.body["success"], true);
        assert_eq!(res.body["totalRows"], 1);
        assert!(res.body["sessionId"].is_number());
        let upload_id = res.body["uploadId"].as_str().unwrap();
        assert!(upload_id.starts_with("upload_"));
        assert_eq!(res.body["statusEndpoint"], routes::upload(upload_id));
        assert_eq!(res.body["streamEndpoint"], routes::upload_stream(upload_id));
    }

    #[tokio::test]
    async fn guest_cannot_upload() {
        let app = TestApp::spawn().await;
        let token = app.create_authenticated_user("visitor", "securepass").await;

        let res = app
            .upload_with_token(
                "roster.csv",
                "text/csv",
                roster(&["A1,Ada,Lovelace,7B,7,a@example.com"]),
                &token,
            )
            .await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn missing_file_field_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;

        let form = reqwest::multipart::Form::new().text("note", "no file here");
        let res = app
            .client
            .post(app.url(routes::UPLOADS))
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(res.status().as_u16(), 400);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn non_csv_file_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;

        let res = app
            .upload_with_token(
                "roster.xlsx",
                "application/octet-stream",
                b"PK\x03\x04".to_vec(),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn header_only_csv_is_rejected_without_a_session() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;

        let res = app
            .upload_with_token(
                "roster.csv",
                "text/csv",
                format!("{HEADER}\n,,,,,\n").into_bytes(),
                &token,
            )
            .await;
        assert_eq!(res.status, 400);
        assert!(res.body["message"].as_str().unwrap().contains("no data rows"));

        let list = app.get_with_token(routes::UPLOADS, &token).await;
        assert_eq!(list.body["pagination"]["totalSessions"], 0);
    }

    #[tokio::test]
    async fn missing_columns_are_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;

        let res = app
            .upload_with_token(
                "roster.csv",
                "text/csv",
                b"name,email\nAda,a@example.com\n".to_vec(),
                &token,
            )
            .await;

        assert_eq!(res.status, 400);
        assert!(res.body["message"].as_str().unwrap().contains("admission_no"));
    }
}

mod processing {
    use super::*;

    #[tokio::test]
    async fn invalid_row_is_logged_and_batch_completes() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;

        let upload_id = app
            .upload_roster(
                roster(&[
                    "A1,Ada,Lovelace,7B,Year 7,ada.parent@example.com",
                    "A2,Alan,Turing,7B,Year 7,not-an-email",
                    "A3,Grace,Hopper,8C,Year 8,grace.parent@example.com",
                ]),
                &token,
            )
            .await;

        let res = app.wait_for_terminal(&upload_id, &token).await;

        assert_eq!(res.body["status"], "completed");
        assert_eq!(res.body["totalRows"], 3);
        assert_eq!(res.body["processedRows"], 3);
        assert_eq!(res.body["successCount"], 2);
        assert_eq!(res.body["errorCount"], 1);
        assert!(res.body["completedAt"].is_string());

        let logs = res.body["logs"].as_array().unwrap();
        let numbers: Vec<i64> = logs.iter().map(|l| l["rowNumber"].as_i64().unwrap()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(logs[1]["status"], "error");
        assert_eq!(logs[1]["reference"], "A2");
        assert!(logs[1]["message"].as_str().unwrap().contains("not-an-email"));
        assert_eq!(logs[0]["studentAction"], "created");
        assert_eq!(logs[0]["parentAction"], "created");
        assert_eq!(logs[0]["linked"], "created");
    }

    #[tokio::test]
    async fn reupload_updates_and_keeps_a_single_link() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;
        let csv = roster(&["A1,Ada,Lovelace,7B,Year 7,ada.parent@example.com"]);

        let first = app.upload_roster(csv.clone(), &token).await;
        let first = app.wait_for_terminal(&first, &token).await;
        let second = app.upload_roster(csv, &token).await;
        let second = app.wait_for_terminal(&second, &token).await;

        let a = &first.body["logs"][0];
        let b = &second.body["logs"][0];
        assert_eq!(a["studentAction"], "created");
        assert_eq!(b["studentAction"], "updated");
        assert_eq!(b["parentAction"], "updated");
        assert_eq!(b["linked"], "existing");
        assert_eq!(a["studentId"], b["studentId"]);
        assert_eq!(a["parentId"], b["parentId"]);
    }
}

mod streaming {
    use super::*;

    #[tokio::test]
    async fn unknown_upload_gets_a_single_not_found_frame() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;

        let (content_type, frames) = app.stream_frames("upload_does_not_exist", &token).await;

        assert!(content_type.starts_with("application/x-ndjson"));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "error");
        assert_eq!(frames[0]["data"]["status"], "not_found");
    }

    #[tokio::test]
    async fn stream_ends_with_completed_at_full_percentage() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;
        let upload_id = app
            .upload_roster(
                roster(&[
                    "A1,Ada,Lovelace,7B,Year 7,ada.parent@example.com",
                    "A2,Alan,Turing,7B,Year 7,alan.parent@example.com",
                ]),
                &token,
            )
            .await;

        let (_, frames) = app.stream_frames(&upload_id, &token).await;

        assert_eq!(frames.first().unwrap()["type"], "started");
        let last = frames.last().unwrap();
        assert_eq!(last["type"], "completed");
        assert_eq!(last["data"]["percentage"], 100);
        assert_eq!(last["data"]["processedStudents"], 2);
        assert_eq!(last["data"]["uploadId"], upload_id.as_str());
        for frame in &frames[1..frames.len() - 1] {
            assert_eq!(frame["type"], "progress");
        }
    }

    #[tokio::test]
    async fn other_users_cannot_watch_an_upload() {
        let app = TestApp::spawn().await;
        let owner = app.create_user_with_role("office", "securepass", "staff").await;
        let other = app.create_user_with_role("office2", "securepass", "staff").await;
        let upload_id = app
            .upload_roster(roster(&["A1,Ada,Lovelace,7B,7,a@example.com"]), &owner)
            .await;

        let (_, frames) = app.stream_frames(&upload_id, &other).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["data"]["status"], "not_found");

        let res = app.get_with_token(&routes::upload(&upload_id), &other).await;
        assert_eq!(res.status, 404);
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn sessions_are_owner_scoped_and_paginated() {
        let app = TestApp::spawn().await;
        let staff = app.create_user_with_role("office", "securepass", "staff").await;
        let admin = app.create_user_with_role("head", "securepass", "admin").await;

        for i in 0..3 {
            let line = format!("A{i},Ada{i},Lovelace,7B,7,p{i}@example.com");
            let id = app.upload_roster(roster(&[&line]), &staff).await;
            app.wait_for_terminal(&id, &staff).await;
        }
        let id = app
            .upload_roster(roster(&["B1,Alan,Turing,7B,7,alan@example.com"]), &admin)
            .await;
        app.wait_for_terminal(&id, &admin).await;

        let page = app
            .get_with_token(&format!("{}?page=1&limit=2", routes::UPLOADS), &staff)
            .await;
        assert_eq!(page.status, 200, "{}", page.text);
        assert_eq!(page.body["sessions"].as_array().unwrap().len(), 2);
        assert_eq!(
            page.body["pagination"],
            json!({
                "currentPage": 1,
                "totalPages": 2,
                "totalSessions": 3,
                "hasNextPage": true,
                "hasPrevPage": false,
            })
        );

        let all = app.get_with_token(routes::UPLOADS, &admin).await;
        assert_eq!(all.body["pagination"]["totalSessions"], 4);

        let filtered = app
            .get_with_token(&format!("{}?status=error", routes::UPLOADS), &admin)
            .await;
        assert_eq!(filtered.body["pagination"]["totalSessions"], 0);
    }

    #[tokio::test]
    async fn unknown_status_filter_is_rejected() {
        let app = TestApp::spawn().await;
        let token = app.create_user_with_role("office", "securepass", "staff").await;

        let res = app
            .get_with_token(&format!("{}?status=bogus", routes::UPLOADS), &token)
            .await;

        assert_eq!(res.status, 400);
    }
}

mod storage {
    use portal_server::entity::class_group;
    use sea_orm::{
        ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait, QueryFilter,
        Statement,
    };

    use super::*;

    #[tokio::test]
    async fn concurrent_uploads_share_reference_rows() {
        let app = TestApp::spawn().await;
        let first = app.create_user_with_role("office", "securepass", "staff").await;
        let second = app.create_user_with_role("office2", "securepass", "staff").await;

        let a = roster(&[
            "C1,Ada,Lovelace,9Z,Year 9,ada.parent@example.com",
            "C2,Alan,Turing,9Z,Year 9,alan.parent@example.com",
        ]);
        let b = roster(&[
            "D1,Grace,Hopper,9Z,Year 9,grace.parent@example.com",
            "D2,Edsger,Dijkstra,9Z,Year 9,edsger.parent@example.com",
        ]);
        let (id_a, id_b) = tokio::join!(
            app.upload_roster(a, &first),
            app.upload_roster(b, &second)
        );

        for (id, token) in [(&id_a, &first), (&id_b, &second)] {
            let res = app.wait_for_terminal(id, token).await;
            assert_eq!(res.body["status"], "completed");
            assert_eq!(res.body["successCount"], 2, "{}", res.text);
        }

        let classes = class_group::Entity::find()
            .filter(class_group::Column::Name.eq("9Z"))
            .count(&app.db)
            .await
            .unwrap();
        assert_eq!(classes, 1);
    }

    #[tokio::test]
    async fn startup_indexes_exist() {
        let app = TestApp::spawn().await;
        let backend = app.db.get_database_backend();
        let sql = match backend {
            DbBackend::Sqlite => "SELECT name FROM sqlite_master WHERE type = 'index'",
            _ => "SELECT indexname AS name FROM pg_indexes",
        };

        let rows = app
            .db
            .query_all_raw(Statement::from_string(backend, sql.to_string()))
            .await
            .unwrap();
        let names: Vec<String> = rows
            .iter()
            .map(|r| r.try_get::<String>("", "name").unwrap())
            .collect();

        for index in [
            "idx_upload_session_owner_started",
            "idx_upload_session_started",
            "idx_upload_log_session",
        ] {
            assert!(names.iter().any(|n| n == index), "missing {index}");
        }
    }
}
