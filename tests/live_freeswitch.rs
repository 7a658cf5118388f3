//! Integration tests against a live FreeSWITCH instance.
//!
//! These tests require FreeSWITCH ESL on 127.0.0.1:8022 with password ClueCon.
//! Run with: cargo test --test live_freeswitch -- --ignored

use esl_socket::{EslClient, EslConnection, EslError, EslHeaders, EventFormat};
use std::time::Duration;

const ESL_HOST: &str = "127.0.0.1:8022";
const ESL_PASSWORD: &str = "ClueCon";
const ESL_TIMEOUT: Duration = Duration::from_secs(10);

async fn connect() -> EslClient {
    let client = EslClient::connect(ESL_HOST, ESL_PASSWORD, 3, ESL_TIMEOUT)
        .await
        .expect("failed to connect to FreeSWITCH");
    client.set_command_timeout(Duration::from_secs(10));
    client
}

#[tokio::test]
#[ignore]
async fn live_connect_and_status() {
    let client = connect().await;
    assert!(client.is_connected());

    let resp = client
        .api("status", "")
        .await
        .unwrap();
    let body = resp
        .body_str()
        .expect("status should have body");
    assert!(body.contains("UP"), "expected UP in status: {}", body);
}

#[tokio::test]
#[ignore]
async fn live_wrong_password() {
    let err = EslConnection::connect(ESL_HOST, "definitely-not-the-password", 0, ESL_TIMEOUT)
        .await
        .unwrap_err();
    assert!(
        matches!(err, EslError::LoginFailed { .. }),
        "unexpected error: {err}"
    );
}

#[tokio::test]
#[ignore]
async fn live_raw_login() {
    let mut conn = EslConnection::dial(ESL_HOST, ESL_PASSWORD, 3, ESL_TIMEOUT)
        .await
        .unwrap();
    assert!(conn
        .login()
        .await
        .unwrap());

    conn.send("api uptime")
        .await
        .unwrap();
    let reply = conn
        .read_message()
        .await
        .unwrap();
    assert!(reply
        .body_str()
        .is_some());
    conn.close()
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn live_api_multiple_commands() {
    let client = connect().await;

    for (cmd, args) in [("status", ""), ("show", "channels"), ("global_getvar", "hostname")] {
        let resp = client
            .api(cmd, args)
            .await
            .unwrap();
        assert!(
            !resp.has_error(),
            "{} {} failed: {:?}",
            cmd,
            args,
            resp.error_detail()
        );
    }
}

#[tokio::test]
#[ignore]
async fn live_api_err_body() {
    let client = connect().await;

    let resp = client
        .api("nonexistent_command_xyz", "")
        .await
        .unwrap();
    assert!(resp.has_error());
    assert!(resp
        .error_detail()
        .is_some());
}

#[tokio::test]
#[ignore]
async fn live_bgapi_returns_job_uuid() {
    let client = connect().await;

    let resp = client
        .bgapi("status", "")
        .await
        .unwrap();
    assert!(!resp.has_error());
    assert!(resp
        .job_uuid()
        .is_some());
}

#[tokio::test]
#[ignore]
async fn live_filter_and_delete() {
    let client = connect().await;

    let resp = client
        .filter_with_output(EventFormat::Json, "Event-Name", "HEARTBEAT")
        .await
        .unwrap();
    assert!(!resp.has_error(), "filter failed: {:?}", resp.reply_text());

    let resp = client
        .filter_delete("Event-Name", Some("HEARTBEAT"))
        .await
        .unwrap();
    assert!(!resp.has_error());

    client
        .filter_delete_all()
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn live_sendevent_custom() {
    let client = connect().await;

    let headers = EslHeaders::new();
    headers.set("Event-Subclass", "esl_test::live");
    headers.set("X-Test-Pid", std::process::id());

    let resp = client
        .send_event("CUSTOM", &headers, Some("hello from the test suite"))
        .await
        .unwrap();
    assert!(
        !resp.has_error(),
        "sendevent failed: {:?}",
        resp.reply_text()
    );
}

#[tokio::test]
#[ignore]
async fn live_concurrent_api() {
    let client = connect().await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .api("status", "")
                    .await
            })
        })
        .collect();

    for task in tasks {
        let resp = task
            .await
            .unwrap()
            .unwrap();
        assert!(!resp.has_error());
    }
    client
        .close()
        .await
        .unwrap();
}
