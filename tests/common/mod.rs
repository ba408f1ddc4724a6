// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use competency_backend::{
    config::{AssessmentConfig, Config},
    engine::{CompetencyLevel, OptionLabel},
    models::question::{CreateQuestionRequest, QuestionOptions},
    routes,
    services::{
        AssessmentService, CertificateService, CertificateTrigger, HttpCertificateService,
        UnconfiguredCertificateService,
    },
    state::AppState,
    store::{InMemoryAssessmentRepository, InMemoryQuestionRepository, QuestionRepository},
    utils::jwt::sign_jwt,
};
use serde_json::{Value, json};
use url::Url;

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub questions: Arc<InMemoryQuestionRepository>,
}

/// A certificate service that refuses the first `failures` requests.
pub struct CertificateStub {
    pub url: Url,
    pub calls: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct StubState {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

async fn issue_stub(State(stub): State<StubState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let n = stub.calls.fetch_add(1, Ordering::SeqCst);
    if n < stub.failures {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "try again later" })),
        );
    }
    let assessment_id = body["assessmentId"].as_i64().unwrap_or_default();
    (
        StatusCode::CREATED,
        Json(json!({
            "certificateId": format!("cert-{}", assessment_id),
            "certificateNumber": format!("DC-{}-{}", body["level"].as_str().unwrap_or("?"), assessment_id),
            "verificationCode": "VERIFY1234",
        })),
    )
}

pub async fn spawn_certificate_stub(failures: usize) -> CertificateStub {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/certificates", post(issue_stub))
        .with_state(StubState {
            calls: calls.clone(),
            failures,
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    CertificateStub {
        url: Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap(),
        calls,
    }
}

/// Seeds `per_level` questions for every level. The correct option rotates
/// through a-d.
async fn seed_questions(repo: &InMemoryQuestionRepository, per_level: usize) {
    const LABELS: [OptionLabel; 4] = [OptionLabel::A, OptionLabel::B, OptionLabel::C, OptionLabel::D];
    for level in CompetencyLevel::ALL {
        for i in 0..per_level {
            repo.create(CreateQuestionRequest {
                competency: "Information and data literacy".to_string(),
                level,
                question_text: format!("{} question #{}", level, i),
                options: QuestionOptions {
                    a: "first".into(),
                    b: "second".into(),
                    c: "third".into(),
                    d: "fourth".into(),
                },
                correct_answer: LABELS[i % 4],
            })
            .await
            .expect("Failed to seed question");
        }
    }
}

/// Spawns the app on a random port, backed by the in-memory store.
pub async fn spawn_app(per_level: usize, certificates: Option<&CertificateStub>) -> TestApp {
    let questions = Arc::new(InMemoryQuestionRepository::new());
    seed_questions(&questions, per_level).await;
    let assessments = Arc::new(InMemoryAssessmentRepository::new());

    let config = Config {
        database_url: None,
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        certificate_service_url: certificates.map(|stub| stub.url.clone()),
        assessment: AssessmentConfig::default(),
    };

    let certificate_service: Arc<dyn CertificateService> = match &config.certificate_service_url {
        Some(url) => Arc::new(HttpCertificateService::new(url, std::time::Duration::from_secs(5)).unwrap()),
        None => Arc::new(UnconfiguredCertificateService),
    };
    let trigger = CertificateTrigger::new(assessments.clone(), certificate_service);
    let service = Arc::new(AssessmentService::new(
        assessments,
        questions.clone(),
        trigger,
        config.assessment.clone(),
    ));

    let state = AppState {
        service,
        questions: questions.clone(),
        config,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        questions,
    }
}

pub fn other_label(label: OptionLabel) -> &'static str {
    match label {
        OptionLabel::A => "b",
        OptionLabel::B => "c",
        OptionLabel::C => "d",
        OptionLabel::D => "a",
    }
}

impl TestApp {
    pub fn token(&self, user_id: i64, role: &str) -> String {
        sign_jwt(user_id, role, JWT_SECRET, 600).unwrap()
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .put(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn start(&self, token: &str) -> Value {
        let response = self.post("/api/assessment/start", token, json!({})).await;
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }

    /// Fetches a step's questions and returns their ids in served order.
    pub async fn fetch_step(&self, token: &str, step: u8) -> Vec<i64> {
        let response = self
            .get(&format!("/api/assessment/step/{}/questions", step), token)
            .await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        body["questions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["id"].as_i64().unwrap())
            .collect()
    }

    /// Answers the first `correct` questions right and the rest wrong.
    pub async fn answers(&self, ids: &[i64], correct: usize) -> Value {
        let mut answers = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            let question = self.questions.get(*id).await.unwrap().unwrap();
            let answer = if i < correct {
                question.correct_answer.as_str()
            } else {
                other_label(question.correct_answer)
            };
            answers.push(json!({ "questionId": id, "answer": answer, "timeSpent": 30 }));
        }
        Value::Array(answers)
    }

    pub async fn submit(&self, token: &str, step: u8, answers: Value) -> reqwest::Response {
        self.post(
            &format!("/api/assessment/step/{}/submit", step),
            token,
            json!({ "answers": answers }),
        )
        .await
    }

    /// Fetches a step and submits it with `correct` right answers.
    pub async fn take_step(&self, token: &str, step: u8, correct: usize) -> Value {
        let ids = self.fetch_step(token, step).await;
        let answers = self.answers(&ids, correct).await;
        let response = self.submit(token, step, answers).await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }

    pub async fn status(&self, token: &str) -> Value {
        let response = self.get("/api/assessment/status", token).await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }

    /// Polls the status until `ready` accepts it. Certificates are issued
    /// in the background, after the submission has answered.
    pub async fn wait_for_status(&self, token: &str, ready: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let status = self.status(token).await;
            if ready(&status) {
                return status;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("status never reached the expected state");
    }
}
