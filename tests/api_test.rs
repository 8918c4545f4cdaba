//! End-to-end tests against a running advisord server with a scripted model

mod common;

use std::path::Path;

use advisord::analysis::Category;
use advisord::backend::Modality;
use advisord::protocol::AnalyzeResponse;
use advisord::session::{ClientState, History, Session};
use advisord::AdvisorError;
use common::{AdvisorTest, ANALYSIS_ABC};
use reqwest::StatusCode;

#[tokio::test]
async fn test_health_and_root() {
    let t = AdvisorTest::start().await.unwrap();

    let health: serde_json::Value = t.get("/health").await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "healthy");

    let root: serde_json::Value = t.get("/").await.unwrap().json().await.unwrap();
    assert_eq!(root["name"], "advisord");
}

#[tokio::test]
async fn test_incremental_skips_step_without_image() {
    let t = AdvisorTest::start().await.unwrap();
    t.backend.push_text(ANALYSIS_ABC);
    t.backend.push_image(b"img-a");
    t.backend.push_text("Could not render the bike lane.");
    t.backend.push_image(b"img-c");

    let response = t
        .upload("?incremental=true", "street.jpg", "image/jpeg", b"jpeg".to_vec())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: AnalyzeResponse = response.json().await.unwrap();

    assert!(body.success);
    assert_eq!(body.analysis.recommendations.len(), 3);
    assert_eq!(body.incremental_images.len(), 2);

    let categories: Vec<Category> = body.steps.iter().map(|s| s.category).collect();
    assert_eq!(categories, vec![Category::Walkability, Category::Greenery]);
    let indices: Vec<usize> = body.steps.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1]);

    // The final image is the C output
    let final_bytes = t
        .get(&body.image_url.url())
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&final_bytes[..], b"img-c");

    // Step files keep the recommendation position
    let results = t.files_in("results");
    assert_eq!(results.len(), 3);
    assert!(results.iter().any(|f| f.ends_with("-step-1.png")));
    assert!(results.iter().any(|f| f.ends_with("-step-3.png")));

    // One analysis call then three chained image calls
    let calls = t.backend.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0].mode, Modality::Text);
    assert_eq!(calls[0].images[0].mime_type, "image/jpeg");
    assert_eq!(calls[3].images[0].data, b"img-a");
}

#[tokio::test]
async fn test_all_steps_empty_falls_back_to_single_shot() {
    let t = AdvisorTest::start().await.unwrap();
    t.backend.push_text(ANALYSIS_ABC);
    for _ in 0..3 {
        t.backend.push_empty();
    }
    t.backend.push_image(b"combined");

    let body: AnalyzeResponse = t
        .upload("?incremental=true", "street.png", "image/png", b"png".to_vec())
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body.incremental_images, vec![body.image_url.clone()]);
    assert_eq!(body.incremental_changes.len(), 3);
    assert_eq!(t.backend.call_count(), 5);
}

#[tokio::test]
async fn test_single_shot_mode() {
    let t = AdvisorTest::start().await.unwrap();
    t.backend.push_text(ANALYSIS_ABC);
    t.backend.push_image(b"combined");

    let body: AnalyzeResponse = t
        .upload("", "street.png", "image/png", b"png".to_vec())
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(t.backend.call_count(), 2);
    assert!(body.steps.iter().all(|s| s.image == body.image_url));
    assert!(body.image_url.file_name().starts_with("improved-"));
}

#[tokio::test]
async fn test_unstructured_analysis_still_visualizes() {
    let t = AdvisorTest::start().await.unwrap();
    t.backend.push_text("I think this space needs work.");
    t.backend.push_image(b"combined");

    let body: AnalyzeResponse = t
        .upload("?incremental=true", "street.png", "image/png", b"png".to_vec())
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(
        body.analysis.raw_text.as_deref(),
        Some("I think this space needs work.")
    );
    assert_eq!(body.steps.len(), 1);
    assert_eq!(body.steps[0].category, Category::Other);
}

#[tokio::test]
async fn test_oversized_upload_rejected_before_model_call() {
    let t = AdvisorTest::start_with(|c| c.max_upload_bytes = 1024).await.unwrap();

    let response = t
        .upload("", "big.png", "image/png", vec![0u8; 4096])
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("exceeds"));
    assert_eq!(t.backend.call_count(), 0);
    assert!(t.files_in("uploads").is_empty());
}

#[tokio::test]
async fn test_client_rejects_20mb_file_locally() {
    let t = AdvisorTest::start().await.unwrap();

    let err = t
        .advisor_client()
        .analyze(vec![0u8; 20 * 1024 * 1024], "plaza.jpg", true)
        .await
        .unwrap_err();
    assert!(matches!(err, AdvisorError::Validation(_)));
    assert_eq!(t.backend.call_count(), 0);
}

#[tokio::test]
async fn test_unsupported_type_rejected() {
    let t = AdvisorTest::start().await.unwrap();

    let response = t
        .upload("", "plaza.gif", "image/gif", b"GIF89a".to_vec())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(t.backend.call_count(), 0);
}

#[tokio::test]
async fn test_transport_error_surfaces_and_cleans_upload() {
    let t = AdvisorTest::start().await.unwrap();
    t.backend
        .push(Err(AdvisorError::Transport("API error: 503 Service Unavailable".into())));

    let response = t
        .upload("", "street.png", "image/png", b"png".to_vec())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["details"].as_str().unwrap().contains("503"));
    assert!(t.files_in("uploads").is_empty());
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let t = AdvisorTest::start_with(|c| c.rate_limit_per_minute = 1)
        .await
        .unwrap();
    t.backend.push_text(ANALYSIS_ABC);
    t.backend.push_image(b"combined");

    let first = t
        .upload("", "a.png", "image/png", b"png".to_vec())
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = t
        .upload("", "a.png", "image/png", b"png".to_vec())
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_client_session_history_flow() {
    let t = AdvisorTest::start().await.unwrap();
    t.backend.push_text(ANALYSIS_ABC);
    t.backend.push_image(b"img-a");
    t.backend.push_image(b"img-b");
    t.backend.push_image(b"img-c");

    let photo = t.data_dir.path().join("street.jpg");
    std::fs::write(&photo, b"jpeg").unwrap();

    let client = t.advisor_client();
    let state = ClientState::new()
        .select(photo.clone())
        .and_then(ClientState::preview_loaded)
        .and_then(ClientState::submit)
        .unwrap();

    let result = client
        .analyze_file(&photo, true)
        .await
        .map(|r| Session::from_response(&photo, r))
        .map_err(|e| e.to_string());
    let state = state.settle(result).unwrap();

    let session = state.session().unwrap().clone();
    assert_eq!(session.steps.len(), 3);

    let state = state.jump_to_category(Category::Greenery).unwrap();
    let url = state.active_image_url().unwrap();
    assert!(url.contains("-step-3.png?t="));

    let bytes = client
        .fetch_image(session.image_at(state.cursor().unwrap().index()))
        .await
        .unwrap();
    assert_eq!(bytes, b"img-c");

    let history_path = t.data_dir.path().join("history.json");
    let mut history = History::load(&history_path).await;
    history.insert(session.clone());
    history.save(&history_path).await.unwrap();

    let reloaded = History::load(Path::new(&history_path)).await;
    assert_eq!(reloaded.get(session.id), Some(&session));
}
