//! Hot reload of the model preset while the router is serving.

use std::time::Duration;

mod common;

use common::{eventually, start_router, test_config, PresetFile};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_hot_reload_add_new_model() {
    let preset = PresetFile::new("version = 1\n\n[test-model-1]\nhf_repo = ggml-org/test-model-stories260K\n");
    let router = start_router(test_config(&preset)).await;
    let r = &router;

    assert_eq!(router.model_ids().await, vec!["test-model-1"]);

    preset.append("\n[test-model-2]\nhf_repo = ggml-org/test-model-stories260K-infill\n");
    assert!(eventually(WAIT, || async move { r.model_ids().await.len() == 2 }).await);

    let ids = router.model_ids().await;
    assert!(ids.contains(&"test-model-1".to_string()));
    assert!(ids.contains(&"test-model-2".to_string()));
    router.stop().await;
}

#[tokio::test]
async fn test_hot_reload_update_existing_model() {
    let preset = PresetFile::new(
        "version = 1\n\n[test-model-update]\nhf_repo = ggml-org/test-model-stories260K\nctx_size = 512\n",
    );
    let router = start_router(test_config(&preset)).await;
    let r = &router;

    let model = router.model("test-model-update").await.unwrap();
    assert_eq!(model.status.revision, 1);
    assert_eq!(model.attributes["ctx_size"], "512");

    preset.write(
        "version = 1\n\n[test-model-update]\nhf_repo = ggml-org/test-model-stories260K\nctx_size = 1024\n",
    );
    assert!(
        eventually(WAIT, || async move {
            r.model("test-model-update").await.unwrap().status.revision == 2
        })
        .await
    );

    let model = router.model("test-model-update").await.unwrap();
    assert_eq!(model.attributes["ctx_size"], "1024");
    assert_eq!(model.status.value, "unloaded");
    router.stop().await;
}

#[tokio::test]
async fn test_hot_reload_remove_model() {
    let preset = PresetFile::new(
        "version = 1\n\n[test-model-remove-1]\nhf_repo = ggml-org/test-model-stories260K\n\n[test-model-remove-2]\nhf_repo = ggml-org/test-model-stories260K-infill\n",
    );
    let router = start_router(test_config(&preset)).await;
    let r = &router;
    assert_eq!(router.model_ids().await.len(), 2);

    preset.write("version = 1\n\n[test-model-remove-1]\nhf_repo = ggml-org/test-model-stories260K\n");
    assert!(
        eventually(WAIT, || async move {
            !r.model("test-model-remove-2").await.unwrap().status.in_config
        })
        .await
    );

    // Removed entries stay listed.
    let removed = router.model("test-model-remove-2").await.unwrap();
    assert_eq!(removed.status.value, "unloaded");
    assert!(router.model("test-model-remove-1").await.unwrap().status.in_config);
    router.stop().await;
}

#[tokio::test]
async fn test_hot_reload_invalid_config() {
    let preset = PresetFile::new("version = 1\n\n[test-model-invalid]\nhf_repo = ggml-org/test-model-stories260K\n");
    let router = start_router(test_config(&preset)).await;
    let r = &router;

    // A document that does not parse is ignored as a whole.
    preset.write("version = 1\n\n[test-model-invalid]\nhf_repo = a\n[test-model-invalid]\n");
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let model = router.model("test-model-invalid").await.unwrap();
    assert_eq!(model.status.revision, 1);
    assert!(model.status.in_config);

    // A parseable document with a broken entry is applied; the entry is listed.
    preset.write("version = 1\n\n[broken-model]\nhf_repo = non-existent-repo\nctx_size = lots\n");
    assert!(eventually(WAIT, || async move { r.model("broken-model").await.is_some() }).await);

    let broken = router.model("broken-model").await.unwrap();
    assert_eq!(broken.status.value, "unloaded");
    assert!(broken.last_error.unwrap().contains("ctx_size"));

    let previous = router.model("test-model-invalid").await.unwrap();
    assert_eq!(previous.status.value, "unloaded");
    assert!(!previous.status.in_config);
    router.stop().await;
}

#[tokio::test]
async fn test_hot_reload_custom_interval() {
    let preset = PresetFile::new("version = 1\n\n[test-model-interval]\nhf_repo = ggml-org/test-model-stories260K\n");
    let mut config = test_config(&preset);
    config.models.watch_interval_secs = 2;
    let router = start_router(config).await;
    let r = &router;

    preset.append("\n[test-model-interval-2]\nhf_repo = ggml-org/test-model-stories260K-infill\n");
    // Picked up within one interval plus scheduling slack, not instantly.
    assert!(eventually(Duration::from_secs(4), || async move { r.model_ids().await.len() == 2 }).await);
    router.stop().await;
}

#[tokio::test]
async fn test_hot_reload_disabled() {
    let preset = PresetFile::new("[a]\nhf_repo = org/a\n");
    let mut config = test_config(&preset);
    config.models.watch = false;
    let router = start_router(config).await;

    preset.append("\n[b]\nhf_repo = org/b\n");
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(router.model_ids().await, vec!["a"]);
    router.stop().await;
}

#[tokio::test]
async fn test_hot_reload_multiple_changes() {
    let preset = PresetFile::new("version = 1\n\n[test-model-multi]\nhf_repo = ggml-org/test-model-stories260K\n");
    let router = start_router(test_config(&preset)).await;
    let r = &router;

    for i in 2..4 {
        preset.append(&format!(
            "\n[test-model-multi-{}]\nhf_repo = ggml-org/test-model-stories260K-infill\n",
            i
        ));
    }
    assert!(eventually(WAIT, || async move { r.model_ids().await.len() == 3 }).await);

    let ids = router.model_ids().await;
    for name in ["test-model-multi", "test-model-multi-2", "test-model-multi-3"] {
        assert!(ids.contains(&name.to_string()), "missing {}", name);
    }
    router.stop().await;
}

#[tokio::test]
async fn test_hot_reload_with_on_demand_disabled() {
    let preset = PresetFile::new("version = 1\n\n[test-model-loaded]\nhf_repo = ggml-org/test-model-stories260K\n");
    let mut config = test_config(&preset);
    config.models.on_demand = false;
    let router = start_router(config).await;
    let r = &router;

    assert_eq!(
        router.model("test-model-loaded").await.unwrap().status.value,
        "unloaded"
    );

    preset.write(
        "version = 1\n\n[test-model-loaded]\nhf_repo = ggml-org/test-model-stories260K\ntemperature = 0.9\n",
    );
    assert!(
        eventually(WAIT, || async move {
            r.model("test-model-loaded").await.unwrap().status.revision == 2
        })
        .await
    );
    assert_eq!(
        router.model("test-model-loaded").await.unwrap().status.value,
        "unloaded"
    );
    router.stop().await;
}
