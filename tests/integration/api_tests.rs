//! API integration tests

use serde_json::{json, Value};

use crate::common::TestApp;

const QR: &str = "01,10,144031539110,88723591,327.96,20240115,03064755846,D6A3";

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new().await;
    app.get("/api/v1/health").await.assert_ok();
    app.get("/api/v1/health/ready").await.assert_ok();
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let app = TestApp::new().await;
    app.get("/api/v1/invoices").await.assert_unauthorized();
    app.post_json("/api/v1/invoices", json!({})).await.assert_unauthorized();
    app.get("/api/v1/logs").await.assert_unauthorized();
}

#[tokio::test]
async fn test_login_success_and_failure() {
    let app = TestApp::new().await;
    app.seed_user("zhangsan", "correct-horse", "user").await;

    let response = app
        .post_json(
            "/api/v1/auth/login",
            json!({"username": "zhangsan", "password": "correct-horse"}),
        )
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["username"], "zhangsan");
    assert!(body["user"]["password_hash"].is_null());

    app.post_json(
        "/api/v1/auth/login",
        json!({"username": "zhangsan", "password": "wrong"}),
    )
    .await
    .assert_unauthorized();

    app.post_json(
        "/api/v1/auth/login",
        json!({"username": "nobody", "password": "whatever"}),
    )
    .await
    .assert_unauthorized();
}

#[tokio::test]
async fn test_disabled_user_cannot_login() {
    let app = TestApp::new().await;
    app.seed_user("admin", "admin-password", "admin").await;
    let user = app.seed_user("zhangsan", "correct-horse", "user").await;
    let admin_token = app.login("admin", "admin-password").await;

    app.put_json_auth(
        &format!("/api/v1/users/{}/status", user.id),
        json!({"enabled": false}),
        &admin_token,
    )
    .await
    .assert_ok();

    app.post_json(
        "/api/v1/auth/login",
        json!({"username": "zhangsan", "password": "correct-horse"}),
    )
    .await
    .assert_forbidden();
}

#[tokio::test]
async fn test_login_attempts_are_audited() {
    let app = TestApp::new().await;
    app.seed_user("admin", "admin-password", "admin").await;

    app.post_json(
        "/api/v1/auth/login",
        json!({"username": "intruder", "password": "nope"}),
    )
    .await
    .assert_unauthorized();

    let token = app.login("admin", "admin-password").await;
    let response = app
        .get_auth("/api/v1/logs?action=LOGIN", &token)
        .await;
    response.assert_ok();
    let body: Value = response.json();
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);

    // Newest first: the successful admin login, then the failed attempt
    assert_eq!(logs[0]["username"], "admin");
    assert_eq!(logs[0]["success"], true);
    assert_eq!(logs[1]["username"], "intruder");
    assert_eq!(logs[1]["success"], false);
    assert!(logs[1]["user_id"].is_null());
}

#[tokio::test]
async fn test_invoice_submission_flow() {
    let app = TestApp::new().await;
    app.seed_user("zhangsan", "correct-horse", "user").await;
    let token = app.login("zhangsan", "correct-horse").await;

    // First submission parses and persists
    let response = app
        .post_json_auth(
            "/api/v1/invoices",
            json!({
                "qr_code": QR,
                "holder_name": "张三",
                "voucher_number": "BX-2024-18"
            }),
            &token,
        )
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["invoice"]["number"], "144031539110");
    assert_eq!(body["invoice"]["code"], "88723591");
    assert_eq!(body["invoice"]["issue_date"], "2024-01-15");
    assert_eq!(body["invoice"]["amount"], 327.96);
    let created_id = body["invoice"]["id"].as_str().unwrap().to_string();

    // Identical payload is reported as duplicate, regardless of the
    // optional fields supplied
    let response = app
        .post_json_auth(
            "/api/v1/invoices",
            json!({
                "qr_code": QR,
                "holder_name": "李四",
                "voucher_number": "BX-2024-19"
            }),
            &token,
        )
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["duplicate"], true);
    assert_eq!(
        body["message"],
        "该发票已由 张三 在 BX-2024-18 凭证中报销，请仔细查验！"
    );
    assert_eq!(body["existing_record"]["number"], "144031539110");
    assert_eq!(body["existing_record"]["id"], created_id.as_str());

    // Still a single record
    let response = app.get_auth("/api/v1/invoices", &token).await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["pagination"]["total_records"], 1);
}

#[tokio::test]
async fn test_invoice_submission_rejects_bad_input() {
    let app = TestApp::new().await;
    app.seed_user("zhangsan", "correct-horse", "user").await;
    let token = app.login("zhangsan", "correct-horse").await;

    // Malformed QR payload
    let response = app
        .post_json_auth(
            "/api/v1/invoices",
            json!({
                "qr_code": "a,b,c,d",
                "holder_name": "张三",
                "voucher_number": "BX-2024-18"
            }),
            &token,
        )
        .await;
    response.assert_bad_request();
    assert!(response.text().contains("二维码格式不正确"));

    // Missing required fields
    app.post_json_auth(
        "/api/v1/invoices",
        json!({"qr_code": "", "holder_name": "张三", "voucher_number": "BX-2024-18"}),
        &token,
    )
    .await
    .assert_bad_request();

    app.post_json_auth(
        "/api/v1/invoices",
        json!({"qr_code": QR, "holder_name": "", "voucher_number": "BX-2024-18"}),
        &token,
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_invoice_list_filters_and_pagination() {
    let app = TestApp::new().await;
    app.seed_user("zhangsan", "correct-horse", "user").await;
    let token = app.login("zhangsan", "correct-horse").await;

    for i in 0..7 {
        let response = app
            .post_json_auth(
                "/api/v1/invoices",
                json!({
                    "qr_code": format!("01,10,N{:03},C{:03},100,20240115", i, i),
                    "holder_name": if i % 2 == 0 { "张三" } else { "李四" },
                    "voucher_number": format!("BX-{}", i)
                }),
                &token,
            )
            .await;
        response.assert_ok();
    }

    let response = app
        .get_auth("/api/v1/invoices?page=1&page_size=3", &token)
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["pagination"]["total_records"], 7);
    assert_eq!(body["pagination"]["total_pages"], 3);
    assert_eq!(body["invoices"].as_array().unwrap().len(), 3);

    let response = app
        .get_auth("/api/v1/invoices?number=N003", &token)
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["pagination"]["total_records"], 1);

    let response = app
        .get_auth(
            "/api/v1/invoices?holder_name=%E6%9D%8E%E5%9B%9B",
            &token,
        )
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["pagination"]["total_records"], 3);
}

#[tokio::test]
async fn test_invoice_edit_and_delete() {
    let app = TestApp::new().await;
    app.seed_user("zhangsan", "correct-horse", "user").await;
    let token = app.login("zhangsan", "correct-horse").await;

    let response = app
        .post_json_auth(
            "/api/v1/invoices",
            json!({
                "qr_code": QR,
                "holder_name": "张三",
                "voucher_number": "BX-2024-18"
            }),
            &token,
        )
        .await;
    let body: Value = response.json();
    let id = body["invoice"]["id"].as_str().unwrap().to_string();

    // Only holder and voucher are editable
    let response = app
        .put_json_auth(
            &format!("/api/v1/invoices/{}", id),
            json!({"holder_name": "李四", "voucher_number": "BX-2024-19"}),
            &token,
        )
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["holder_name"], "李四");
    assert_eq!(body["number"], "144031539110");

    app.delete_auth(&format!("/api/v1/invoices/{}", id), &token)
        .await
        .assert_ok();
    app.get_auth(&format!("/api/v1/invoices/{}", id), &token)
        .await
        .assert_not_found();
}

#[tokio::test]
async fn test_admin_routes_forbidden_for_regular_users() {
    let app = TestApp::new().await;
    app.seed_user("zhangsan", "correct-horse", "user").await;
    let token = app.login("zhangsan", "correct-horse").await;

    app.get_auth("/api/v1/logs", &token).await.assert_forbidden();
    app.get_auth("/api/v1/users", &token).await.assert_forbidden();
    app.get_auth("/api/v1/settings", &token).await.assert_forbidden();
}

#[tokio::test]
async fn test_user_management() {
    let app = TestApp::new().await;
    app.seed_user("admin", "admin-password", "admin").await;
    let token = app.login("admin", "admin-password").await;

    // Create
    let response = app
        .post_json_auth(
            "/api/v1/users",
            json!({
                "username": "lisi",
                "realname": "李四",
                "password": "initial-password",
                "role": "user"
            }),
            &token,
        )
        .await;
    response.assert_ok();
    let body: Value = response.json();
    let user_id = body["id"].as_str().unwrap().to_string();

    // Duplicate username rejected
    app.post_json_auth(
        "/api/v1/users",
        json!({
            "username": "lisi",
            "realname": "another",
            "password": "initial-password"
        }),
        &token,
    )
    .await
    .assert_status(axum::http::StatusCode::CONFLICT);

    // Short password rejected
    app.post_json_auth(
        "/api/v1/users",
        json!({"username": "wangwu", "realname": "王五", "password": "short"}),
        &token,
    )
    .await
    .assert_bad_request();

    // Role change, password reset, rename, status toggle
    app.put_json_auth(
        &format!("/api/v1/users/{}/role", user_id),
        json!({"role": "admin"}),
        &token,
    )
    .await
    .assert_ok();

    app.put_json_auth(
        &format!("/api/v1/users/{}/password", user_id),
        json!({"new_password": "reset-password"}),
        &token,
    )
    .await
    .assert_ok();
    app.login("lisi", "reset-password").await;

    app.put_json_auth(
        &format!("/api/v1/users/{}", user_id),
        json!({"realname": "李四丰"}),
        &token,
    )
    .await
    .assert_ok();

    // Delete
    app.delete_auth(&format!("/api/v1/users/{}", user_id), &token)
        .await
        .assert_ok();

    let response = app.get_auth("/api/v1/users", &token).await;
    response.assert_ok();
    let users: Value = response.json();
    assert_eq!(users.as_array().unwrap().len(), 1);

    // Every operation left an audit entry
    let response = app.get_auth("/api/v1/logs/actions", &token).await;
    response.assert_ok();
    let actions: Vec<String> = response.json();
    for expected in [
        "USER_CREATE",
        "USER_ROLE_CHANGE",
        "USER_PASSWORD_CHANGE",
        "USER_EDIT",
        "USER_DELETE",
    ] {
        assert!(actions.contains(&expected.to_string()), "missing {}", expected);
    }
}

#[tokio::test]
async fn test_last_admin_is_protected() {
    let app = TestApp::new().await;
    let admin = app.seed_user("admin", "admin-password", "admin").await;
    let token = app.login("admin", "admin-password").await;

    // Cannot delete yourself, demote or disable the only admin
    app.delete_auth(&format!("/api/v1/users/{}", admin.id), &token)
        .await
        .assert_bad_request();
    app.put_json_auth(
        &format!("/api/v1/users/{}/role", admin.id),
        json!({"role": "user"}),
        &token,
    )
    .await
    .assert_bad_request();
    app.put_json_auth(
        &format!("/api/v1/users/{}/status", admin.id),
        json!({"enabled": false}),
        &token,
    )
    .await
    .assert_bad_request();
}

#[tokio::test]
async fn test_self_password_change() {
    let app = TestApp::new().await;
    app.seed_user("zhangsan", "old-password", "user").await;
    let token = app.login("zhangsan", "old-password").await;

    app.post_json_auth(
        "/api/v1/auth/change-password",
        json!({"old_password": "wrong", "new_password": "new-password"}),
        &token,
    )
    .await
    .assert_bad_request();

    app.post_json_auth(
        "/api/v1/auth/change-password",
        json!({"old_password": "old-password", "new_password": "new-password"}),
        &token,
    )
    .await
    .assert_ok();

    app.login("zhangsan", "new-password").await;
}

#[tokio::test]
async fn test_settings_round_trip() {
    let app = TestApp::new().await;
    app.seed_user("admin", "admin-password", "admin").await;
    let token = app.login("admin", "admin-password").await;

    app.put_json_auth(
        "/api/v1/settings",
        json!({"site_title": "发票管理", "page_size": "20"}),
        &token,
    )
    .await
    .assert_ok();

    let response = app.get_auth("/api/v1/settings", &token).await;
    response.assert_ok();
    let settings: Value = response.json();
    assert_eq!(settings["site_title"], "发票管理");
    assert_eq!(settings["page_size"], "20");

    // Saved settings are audited
    let response = app
        .get_auth("/api/v1/logs?action=CONFIG_UPDATE", &token)
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_log_statistics() {
    let app = TestApp::new().await;
    app.seed_user("admin", "admin-password", "admin").await;
    app.seed_user("zhangsan", "correct-horse", "user").await;

    let token = app.login("admin", "admin-password").await;
    app.login("zhangsan", "correct-horse").await;
    app.post_json(
        "/api/v1/auth/login",
        json!({"username": "zhangsan", "password": "wrong"}),
    )
    .await
    .assert_unauthorized();

    let response = app.get_auth("/api/v1/logs/statistics", &token).await;
    response.assert_ok();
    let stats: Value = response.json();
    assert_eq!(stats["today_logins"], 2);
    assert_eq!(stats["week_logins"], 2);
    assert_eq!(stats["active_users"], 2);
    assert_eq!(stats["failed_logins"], 1);
}

#[tokio::test]
async fn test_logout_is_audited() {
    let app = TestApp::new().await;
    app.seed_user("admin", "admin-password", "admin").await;
    let token = app.login("admin", "admin-password").await;

    app.post_json_auth("/api/v1/auth/logout", json!({}), &token)
        .await
        .assert_ok();

    let response = app
        .get_auth("/api/v1/logs?action=LOGOUT", &token)
        .await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
    assert_eq!(body["logs"][0]["username"], "admin");
}

#[tokio::test]
async fn test_me_endpoint() {
    let app = TestApp::new().await;
    app.seed_user("zhangsan", "correct-horse", "user").await;
    let token = app.login("zhangsan", "correct-horse").await;

    let response = app.get_auth("/api/v1/auth/me", &token).await;
    response.assert_ok();
    let body: Value = response.json();
    assert_eq!(body["username"], "zhangsan");
    assert_eq!(body["role"], "user");
    assert!(body.get("password_hash").is_none());
}
