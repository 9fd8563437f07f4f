//! 命令行集成测试

use std::path::Path;

use assert_cmd::Command;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

const ENV_VARS: &[&str] = &[
    "CHAT_TRANSLATOR_API_ENDPOINT",
    "CHAT_TRANSLATOR_API_KEY",
    "CHAT_TRANSLATOR_MODEL",
    "CHAT_TRANSLATOR_REQUEST_INTERVAL_MS",
    "CHAT_TRANSLATOR_TARGET_LANG",
    "CHAT_TRANSLATOR_AUTO_TRANSLATE",
    "CHAT_TRANSLATOR_CACHE_CAPACITY",
    "CHAT_TRANSLATOR_DATA_DIR",
];

/// 在临时目录中运行、不受外部环境变量影响的命令
fn command(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("chat-translator").unwrap();
    cmd.current_dir(dir).arg("--data-dir").arg(dir.join("data"));
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_init_config_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat-translator.toml");

    command(dir.path())
        .arg("init-config")
        .arg(&path)
        .assert()
        .success();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("request_interval_ms = 900"));
    assert!(content.contains("reply_preset_id = \"random\""));
}

#[test]
fn test_show_config_masks_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(
        &path,
        "api_key = \"sk-secret-1234\"\nmodel = \"deepseek-chat\"\nrequest_interval_ms = 50\n",
    )
    .unwrap();

    let output = command(dir.path())
        .arg("--config")
        .arg(&path)
        .arg("show-config")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("****1234"));
    assert!(!stdout.contains("sk-secret"));
    assert!(stdout.contains("model = \"deepseek-chat\""));
    assert!(stdout.contains("request_interval_ms = 100"));
}

#[test]
fn test_clear_cache_writes_empty_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("ai_translator_cache_v1.json"),
        r#"{"10:1:EN:gpt":"hello"}"#,
    )
    .unwrap();

    command(dir.path()).arg("clear-cache").assert().success();

    let raw = std::fs::read_to_string(data.join("ai_translator_cache_v1.json")).unwrap();
    assert_eq!(raw, "{}");
}

#[test]
fn test_env_docs_lists_variables() {
    let dir = tempfile::tempdir().unwrap();
    let output = command(dir.path()).arg("env-docs").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    for var in ENV_VARS {
        assert!(stdout.contains(var), "missing {}", var);
    }
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = tempfile::tempdir().unwrap();
    command(dir.path()).arg("frobnicate").assert().failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_translate_prints_and_caches_results() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<Value>| async move {
            let prompt = body["messages"][1]["content"].as_str().unwrap_or("").to_string();
            let source = prompt
                .lines()
                .skip_while(|line| *line != "待翻译内容：")
                .nth(1)
                .unwrap_or("")
                .to_string();
            Json(json!({"choices": [{"message": {"content": format!("译文: {}", source.to_uppercase())}}]}))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempfile::tempdir().unwrap();
    let messages = dir.path().join("messages.json");
    std::fs::write(
        &messages,
        json!([
            {"channel_id": "10", "message_id": "1", "author": "Alice", "text": "hello"},
            {"channel_id": "10", "message_id": "2", "author": "Bob", "text": "bye"}
        ])
        .to_string(),
    )
    .unwrap();
    let config = dir.path().join("chat-translator.toml");
    std::fs::write(
        &config,
        format!(
            "api_endpoint = \"http://{}/v1/chat/completions\"\nmodel = \"gpt\"\ntarget_language = \"EN\"\nrequest_interval_ms = 100\n",
            addr
        ),
    )
    .unwrap();

    let root = dir.path().to_path_buf();
    let output = tokio::task::spawn_blocking(move || {
        command(&root)
            .arg("--config")
            .arg(&config)
            .arg("translate")
            .arg("--messages")
            .arg(&messages)
            .output()
            .unwrap()
    })
    .await
    .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("10:1\tHELLO"));
    assert!(stdout.contains("10:2\tBYE"));

    let raw = std::fs::read_to_string(dir.path().join("data/ai_translator_cache_v1.json")).unwrap();
    let snapshot: serde_json::Map<String, Value> = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot.get("10:1:EN:gpt"), Some(&json!("HELLO")));
}
