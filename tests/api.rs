use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use lexchat_backend::core::config::Settings;
use lexchat_backend::core::db;
use lexchat_backend::extract::{AttachmentFormat, ExtractError, OcrEngine};
use lexchat_backend::llm::{ChatCompletion, ChatModel, ChatRequest, LlmError, ToolCall};
use lexchat_backend::server::router::router;
use lexchat_backend::state::AppState;

const ANSWER: &str = r#"{"text": "A landlord must give written notice.", "structured_response": {"answer": "Written notice is required.", "urgency": "medium"}}"#;
const BOUNDARY: &str = "lexchat-test-boundary";

/// Hosted-model stand-in: replays a script, then answers with `ANSWER`.
struct StubModel {
    script: Mutex<VecDeque<Result<ChatCompletion, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl StubModel {
    fn new(script: Vec<Result<ChatCompletion, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ChatCompletion::text(ANSWER)))
    }

    async fn embed(&self, _input: &str) -> Result<Vec<f32>, LlmError> {
        Ok(vec![0.1, 0.2, 0.3])
    }
}

#[derive(Default)]
struct FixedOcr {
    calls: AtomicUsize,
}

#[async_trait]
impl OcrEngine for FixedOcr {
    async fn recognize(
        &self,
        _image: &[u8],
        _format: AttachmentFormat,
    ) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("NOTICE TO VACATE within 30 days".to_string())
    }
}

struct TestApp {
    app: Router,
    model: Arc<StubModel>,
    ocr: Arc<FixedOcr>,
    _dir: tempfile::TempDir,
}

async fn setup(script: Vec<Result<ChatCompletion, LlmError>>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("lexchat.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let mut settings = Settings::default();
    settings.llm.api_key = Some("test-llm-key".to_string());
    settings.search.api_key = Some("test-search-key".to_string());
    // Nothing listens on the discard port, so every web search fails fast.
    settings.search.endpoint = Some("http://127.0.0.1:9/search".to_string());
    settings.search.timeout_secs = 2;
    settings.database.url = Some(database_url.clone());

    let pool = db::connect(&database_url).await.unwrap();
    let model = StubModel::new(script);
    let ocr = Arc::new(FixedOcr::default());
    let state = AppState::from_parts(settings, pool, model.clone(), ocr.clone())
        .await
        .unwrap();

    TestApp {
        app: router(state),
        model,
        ocr,
        _dir: dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// (field name, optional (filename, content type), content)
type Part<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

fn multipart_request(token: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match file {
            Some((filename, content_type)) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    name, filename, content_type
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap()
}

async fn register(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/register",
            None,
            json!({ "name": "Amina", "email": email, "password": "correct horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_agent_and_database() {
    let test = setup(Vec::new()).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&test.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["agent_ready"], true);
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn register_login_and_rejections() {
    let test = setup(Vec::new()).await;
    register(&test.app, "Amina@Example.com").await;

    let (status, body) = send(
        &test.app,
        json_request(
            "POST",
            "/register",
            None,
            json!({ "name": "Other", "email": "amina@example.com", "password": "x" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email already registered");

    let (status, body) = send(
        &test.app,
        json_request(
            "POST",
            "/login",
            None,
            json!({ "email": " amina@example.com ", "password": "correct horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["email"], "amina@example.com");
    assert_eq!(body["token"].as_str().unwrap().len(), 64);

    let (status, _) = send(
        &test.app,
        json_request(
            "POST",
            "/login",
            None,
            json!({ "email": "amina@example.com", "password": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_requires_a_valid_bearer_token() {
    let test = setup(Vec::new()).await;

    let (status, _) = send(
        &test.app,
        json_request("POST", "/chat/text", None, json!({ "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &test.app,
        json_request("POST", "/chat/text", Some("not-a-token"), json!({ "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(test.model.calls(), 0);
}

#[tokio::test]
async fn text_chat_answers_and_persists_history() {
    let test = setup(Vec::new()).await;
    let token = register(&test.app, "amina@example.com").await;

    let (status, body) = send(
        &test.app,
        json_request(
            "POST",
            "/chat/text",
            Some(&token),
            json!({ "message": "How much notice must my landlord give?", "context": "Tenant in Nairobi" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["response"], "A landlord must give written notice.");
    assert_eq!(body["structured_response"]["urgency"], "medium");
    assert_eq!(body["structured_response"]["disclaimer"], "");
    assert_eq!(body["context_used"], json!(["context"]));
    assert_eq!(body["word_count"], 3);
    assert_eq!(body["degraded"], false);
    assert_eq!(body["tool_rounds"], 0);
    assert!(body["prompt"]
        .as_str()
        .unwrap()
        .ends_with("User question: How much notice must my landlord give?"));
    let chat_id = body["chat_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &test.app,
        json_request(
            "POST",
            "/chat/text",
            Some(&token),
            json!({ "message": "And for a commercial lease?", "chat_id": chat_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["chat_id"], chat_id.as_str());
    assert_eq!(body["word_count"], Value::Null);

    {
        let requests = test.model.requests.lock().unwrap();
        // system prompt, previous question and answer, new question
        assert_eq!(requests[1].messages.len(), 4);
    }

    let (status, body) = send(&test.app, get_request("/history", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let chats = body["chats"].as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["title"], "How much notice must my landlord give?");
    assert_eq!(chats[0]["message_count"], 4);

    let (status, body) =
        send(&test.app, get_request(&format!("/history/{}", chat_id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["chat"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "How much notice must my landlord give?");
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn chats_are_private_to_their_owner() {
    let test = setup(Vec::new()).await;
    let owner = register(&test.app, "owner@example.com").await;
    let intruder = register(&test.app, "intruder@example.com").await;

    let (_, body) = send(
        &test.app,
        json_request("POST", "/chat/text", Some(&owner), json!({ "message": "hello" })),
    )
    .await;
    let chat_id = body["chat_id"].as_str().unwrap().to_string();

    let (status, body) =
        send(&test.app, get_request(&format!("/history/{}", chat_id), &intruder)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Chat not found");

    let (status, _) = send(
        &test.app,
        json_request(
            "POST",
            "/chat/text",
            Some(&intruder),
            json!({ "message": "hello", "chat_id": chat_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(test.model.calls(), 1);
}

#[tokio::test]
async fn clear_then_load_returns_no_messages() {
    let test = setup(Vec::new()).await;
    let token = register(&test.app, "amina@example.com").await;

    let (_, body) = send(
        &test.app,
        json_request("POST", "/chat/text", Some(&token), json!({ "message": "hello" })),
    )
    .await;
    let chat_id = body["chat_id"].as_str().unwrap().to_string();

    let clear = Request::builder()
        .method("POST")
        .uri(format!("/chat/clear?chat_id={}", chat_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&test.app, clear).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 2);

    let (_, body) = send(&test.app, get_request(&format!("/history/{}", chat_id), &token)).await;
    assert_eq!(body["chat"]["messages"], json!([]));
}

#[tokio::test]
async fn multipart_chat_extracts_document_and_image() {
    let test = setup(Vec::new()).await;
    let token = register(&test.app, "amina@example.com").await;

    let request = multipart_request(
        &token,
        &[
            ("message", None, &b"Is this notice valid?"[..]),
            (
                "document",
                Some(("lease.txt", "text/plain")),
                &b"Clause 4:   rent due monthly\n\n\nClause 5: no pets"[..],
            ),
            ("image", Some(("notice.png", "image/png")), &b"\x89PNG fake"[..]),
        ],
    );
    let (status, body) = send(&test.app, request).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["document_text"], "Clause 4: rent due monthly\nClause 5: no pets");
    assert_eq!(body["image_text"], "NOTICE TO VACATE within 30 days");
    assert_eq!(body["word_count"], 15);
    assert_eq!(body["context_used"], json!(["document", "image"]));
    let prompt = body["prompt"].as_str().unwrap();
    assert!(prompt.starts_with("Document content:\nClause 4"));
    assert!(prompt.contains("\n\nImage content:\nNOTICE TO VACATE"));
    assert_eq!(test.ocr.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn oversized_image_is_rejected_before_ocr_and_the_model() {
    let test = setup(Vec::new()).await;
    let token = register(&test.app, "amina@example.com").await;
    let image = vec![0u8; 10 * 1024 * 1024 + 1];

    let request = multipart_request(
        &token,
        &[
            ("message", None, &b"What does this notice say?"[..]),
            ("image", Some(("notice.png", "image/png")), &image[..]),
        ],
    );
    let (status, body) = send(&test.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("File too large (10.0MB). Maximum allowed: 10.0MB"));
    assert_eq!(test.ocr.calls.load(Ordering::SeqCst), 0);
    assert_eq!(test.model.calls(), 0);
}

#[tokio::test]
async fn unsupported_upload_is_rejected_before_the_model() {
    let test = setup(Vec::new()).await;
    let token = register(&test.app, "amina@example.com").await;

    let request = multipart_request(
        &token,
        &[
            ("message", None, &b"What does this do?"[..]),
            ("document", Some(("setup.exe", "application/octet-stream")), &b"MZ\x90\x00"[..]),
        ],
    );
    let (status, body) = send(&test.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Unsupported document format: exe"));
    assert_eq!(test.model.calls(), 0);
}

#[tokio::test]
async fn oversized_context_is_rejected_before_the_model() {
    let test = setup(Vec::new()).await;
    let token = register(&test.app, "amina@example.com").await;
    let context = vec!["word"; 501].join(" ");

    let (status, body) = send(
        &test.app,
        json_request(
            "POST",
            "/chat/text",
            Some(&token),
            json!({ "message": "Summarise", "context": context }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Total content too large (501 words). Maximum allowed: 500 words."
    );
    assert_eq!(test.model.calls(), 0);
}

#[tokio::test]
async fn web_search_failure_still_answers_degraded() {
    let search_call = ChatCompletion {
        content: None,
        tool_calls: vec![ToolCall {
            id: "call_0".to_string(),
            name: "search_recent_laws".to_string(),
            arguments: json!({ "query": "eviction notice period", "jurisdiction": "Kenya" }),
        }],
    };
    let test = setup(vec![Ok(search_call)]).await;
    let token = register(&test.app, "amina@example.com").await;

    let (status, body) = send(
        &test.app,
        json_request(
            "POST",
            "/chat/text",
            Some(&token),
            json!({ "message": "What is the latest eviction law in Kenya?" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["degraded"], true);
    assert_eq!(body["tool_rounds"], 1);
    assert!(!body["response"].as_str().unwrap().is_empty());
    assert_eq!(body["tool_errors"].as_array().unwrap().len(), 1);
    assert_eq!(body["agent_actions"][0]["action"], "web_search");
    assert_eq!(body["context_used"], json!([]));
    assert_eq!(test.model.calls(), 2);
}

#[tokio::test]
async fn model_failure_is_service_unavailable() {
    let test = setup(vec![Err(LlmError::Status {
        status: 502,
        body: "bad gateway".to_string(),
    })])
    .await;
    let token = register(&test.app, "amina@example.com").await;

    let (status, body) = send(
        &test.app,
        json_request("POST", "/chat/text", Some(&token), json!({ "message": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Legal AI agent not available"));

    let (status, body) = send(&test.app, get_request("/history", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chats"], json!([]));
}

#[tokio::test]
async fn model_failure_leaves_an_existing_chat_unchanged() {
    let test = setup(vec![
        Ok(ChatCompletion::text(ANSWER)),
        Err(LlmError::Transport("connection reset".to_string())),
    ])
    .await;
    let token = register(&test.app, "amina@example.com").await;

    let (status, body) = send(
        &test.app,
        json_request("POST", "/chat/text", Some(&token), json!({ "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let chat_id = body["chat_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &test.app,
        json_request(
            "POST",
            "/chat/text",
            Some(&token),
            json!({ "message": "and then?", "chat_id": chat_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, body) = send(&test.app, get_request(&format!("/history/{}", chat_id), &token)).await;
    let messages = body["chat"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn knowledge_ingestion_is_closed_without_admin_key() {
    let test = setup(Vec::new()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/knowledge")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-api-key", "anything")
        .body(Body::from(
            json!({ "country": "Kenya", "text": "Rent Restriction Act" }).to_string(),
        ))
        .unwrap();
    let (status, _) = send(&test.app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}
