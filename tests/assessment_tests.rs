// tests/assessment_tests.rs

mod common;

use std::collections::HashSet;

use common::{spawn_app, spawn_certificate_stub};
use serde_json::{Value, json};

#[tokio::test]
async fn unknown_path_is_404() {
    // Arrange
    let app = spawn_app(0, None).await;

    // Act
    let response = app
        .client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let app = spawn_app(0, None).await;

    let response = app
        .client
        .get(format!("{}/api/assessment/status", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);

    let response = app.get("/api/assessment/status", "not-a-jwt").await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn fresh_user_has_no_assessment() {
    let app = spawn_app(0, None).await;
    let token = app.token(1, "student");

    let status = app.status(&token).await;
    assert_eq!(status["hasAssessment"], false);
    assert_eq!(status["isBlocked"], false);
    assert!(status["highestLevel"].is_null());
}

#[tokio::test]
async fn start_opens_step_one_and_rejects_a_second_start() {
    let app = spawn_app(30, None).await;
    let token = app.token(1, "student");

    let assessment = app.start(&token).await;
    assert_eq!(assessment["currentStep"], 1);
    assert_eq!(assessment["isCompleted"], false);
    assert_eq!(assessment["isBlocked"], false);
    assert_eq!(assessment["certificate"]["state"], "not_applicable");

    let response = app.post("/api/assessment/start", &token, json!({})).await;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "assessment_already_active");
}

#[tokio::test]
async fn step_questions_are_balanced_hidden_and_replayed() {
    let app = spawn_app(30, None).await;
    let token = app.token(1, "student");
    app.start(&token).await;

    let response = app.get("/api/assessment/step/1/questions", &token).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let questions = body["questions"].as_array().unwrap();

    assert_eq!(body["step"], 1);
    assert_eq!(body["timePerQuestion"], 60);
    assert_eq!(questions.len(), 44);
    let a1 = questions.iter().filter(|q| q["level"] == "A1").count();
    let a2 = questions.iter().filter(|q| q["level"] == "A2").count();
    assert_eq!((a1, a2), (22, 22));
    assert!(questions.iter().all(|q| q.get("correctAnswer").is_none()));
    let unique: HashSet<i64> = questions.iter().map(|q| q["id"].as_i64().unwrap()).collect();
    assert_eq!(unique.len(), 44);

    // A second fetch replays the same set in the same order.
    let first: Vec<i64> = questions.iter().map(|q| q["id"].as_i64().unwrap()).collect();
    let again = app.fetch_step(&token, 1).await;
    assert_eq!(first, again);
}

#[tokio::test]
async fn advance_then_fail_step_two_keeps_step_one_level() {
    let app = spawn_app(30, None).await;
    let token = app.token(1, "student");
    app.start(&token).await;

    // 35/44 = 79.5%: advance without a final level.
    let step1 = app.take_step(&token, 1, 35).await;
    assert_eq!(step1["score"], 35);
    assert_eq!(step1["totalQuestions"], 44);
    assert_eq!(step1["proceedToNext"], true);
    assert_eq!(step1["isCompleted"], false);
    assert!(step1["finalLevel"].is_null());

    let status = app.status(&token).await;
    assert_eq!(status["assessment"]["currentStep"], 2);

    // Step two serves B1/B2 and never repeats a step one question.
    let step1_ids: HashSet<i64> = status["assessment"]["step1"]["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|id| id.as_i64().unwrap())
        .collect();
    let step2_ids = app.fetch_step(&token, 2).await;
    assert!(step2_ids.iter().all(|id| !step1_ids.contains(id)));

    // 10/44 = 22.7%: below the floor, the level secured at step one stands.
    let answers = app.answers(&step2_ids, 10).await;
    let response = app.submit(&token, 2, answers).await;
    assert_eq!(response.status().as_u16(), 200);
    let step2: Value = response.json().await.unwrap();
    assert_eq!(step2["finalLevel"], "A2");
    assert_eq!(step2["isCompleted"], true);
    assert_eq!(step2["isBlocked"], false);
    assert_eq!(step2["proceedToNext"], false);

    let status = app.status(&token).await;
    assert_eq!(status["highestLevel"], "A2");
    assert_eq!(status["assessment"]["totalTimeSpent"], 88 * 30);
}

#[tokio::test]
async fn passing_every_step_awards_c2() {
    let app = spawn_app(30, None).await;
    let token = app.token(7, "student");
    app.start(&token).await;

    assert_eq!(app.take_step(&token, 1, 40).await["proceedToNext"], true);
    assert_eq!(app.take_step(&token, 2, 40).await["proceedToNext"], true);
    let step3 = app.take_step(&token, 3, 40).await;
    assert_eq!(step3["finalLevel"], "C2");
    assert_eq!(step3["isCompleted"], true);
}

#[tokio::test]
async fn mid_score_awards_upper_level_and_issues_certificate() {
    let stub = spawn_certificate_stub(0).await;
    let app = spawn_app(30, Some(&stub)).await;
    let token = app.token(2, "student");
    app.start(&token).await;

    // 24/44 = 54.5%
    let step1 = app.take_step(&token, 1, 24).await;
    assert_eq!(step1["finalLevel"], "A2");
    assert_eq!(step1["isCompleted"], true);

    let status = app
        .wait_for_status(&token, |s| s["assessment"]["certificate"]["state"] == "issued")
        .await;
    assert_eq!(status["certificate"]["level"], "A2");
    assert!(
        status["certificate"]["certificateNumber"]
            .as_str()
            .unwrap()
            .starts_with("DC-A2-")
    );
    assert_eq!(stub.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    // A completed assessment does not block a new one.
    app.start(&token).await;
}

#[tokio::test]
async fn failing_step_one_blocks_the_user() {
    let app = spawn_app(30, None).await;
    let token = app.token(3, "student");
    app.start(&token).await;

    // 9/44 = 20.5%
    let step1 = app.take_step(&token, 1, 9).await;
    assert_eq!(step1["isBlocked"], true);
    assert_eq!(step1["isCompleted"], true);
    assert!(step1["finalLevel"].is_null());

    let response = app.post("/api/assessment/start", &token, json!({})).await;
    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "user_blocked");

    let status = app.status(&token).await;
    assert_eq!(status["isBlocked"], true);
    assert!(status["certificate"].is_null());
}

#[tokio::test]
async fn requesting_a_step_other_than_the_current_one_is_rejected() {
    let app = spawn_app(30, None).await;
    let token = app.token(4, "student");
    app.start(&token).await;

    let response = app.get("/api/assessment/step/2/questions", &token).await;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "step_not_current");

    let response = app.get("/api/assessment/step/7/questions", &token).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn submitting_before_fetching_or_with_foreign_ids_is_rejected() {
    let app = spawn_app(30, None).await;
    let token = app.token(5, "student");
    app.start(&token).await;

    let response = app.submit(&token, 1, json!([])).await;
    assert_eq!(response.status().as_u16(), 409);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "step_not_opened");

    app.fetch_step(&token, 1).await;
    let response = app
        .submit(&token, 1, json!([{ "questionId": 999_999, "answer": "a", "timeSpent": 5 }]))
        .await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "stale_question_set");

    // The rejected submission left the step open.
    let status = app.status(&token).await;
    assert!(status["assessment"]["step1"]["completedAt"].is_null());
}

#[tokio::test]
async fn unanswered_questions_count_as_wrong() {
    let app = spawn_app(30, None).await;
    let token = app.token(6, "student");
    app.start(&token).await;

    let ids = app.fetch_step(&token, 1).await;
    // Only 34 answers, all correct: 34/44 = 77.3%.
    let answers = app.answers(&ids[..34], 34).await;
    let response = app.submit(&token, 1, answers).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["score"], 34);
    assert_eq!(body["totalQuestions"], 44);
    assert_eq!(body["proceedToNext"], true);
}

#[tokio::test]
async fn concurrent_submissions_score_once() {
    let app = spawn_app(30, None).await;
    let token = app.token(8, "student");
    app.start(&token).await;

    let ids = app.fetch_step(&token, 1).await;
    let answers = app.answers(&ids, 35).await;

    let (first, second) = tokio::join!(
        app.submit(&token, 1, answers.clone()),
        app.submit(&token, 1, answers)
    );
    let mut codes = vec![first.status().as_u16(), second.status().as_u16()];
    codes.sort_unstable();
    assert_eq!(codes, vec![200, 409]);

    let status = app.status(&token).await;
    assert_eq!(status["assessment"]["currentStep"], 2);
    assert_eq!(status["assessment"]["step1"]["result"]["score"], 35);
}

#[tokio::test]
async fn exhausted_question_pool_is_503() {
    let app = spawn_app(10, None).await;
    let token = app.token(9, "student");
    app.start(&token).await;

    let response = app.get("/api/assessment/step/1/questions", &token).await;
    assert_eq!(response.status().as_u16(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "insufficient_question_pool");
}

#[tokio::test]
async fn history_is_paged_newest_first() {
    let app = spawn_app(60, None).await;
    let token = app.token(10, "student");

    app.start(&token).await;
    app.take_step(&token, 1, 24).await;
    let second = app.start(&token).await;

    let response = app.get("/api/assessment/history?page=1&limit=1", &token).await;
    assert_eq!(response.status().as_u16(), 200);
    let page: Value = response.json().await.unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["id"], second["id"]);

    // Someone else's history stays private.
    let other = app.token(11, "student");
    let response = app.get("/api/assessment/history", &other).await;
    let page: Value = response.json().await.unwrap();
    assert_eq!(page["total"], 0);
}
