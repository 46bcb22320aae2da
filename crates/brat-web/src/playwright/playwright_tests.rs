use super::*;

#[test]
fn test_resolve_script_falls_back_to_crate_copy() {
    let launcher = PlaywrightLauncher::new("node", "/definitely/missing/driver.js");
    let script = launcher.resolve_script();
    assert!(script.ends_with(Path::new("scripts").join(SCRIPT_NAME)));
    assert!(script.exists());
}

#[tokio::test]
async fn test_launch_with_missing_node_is_engine_unavailable() {
    let launcher = PlaywrightLauncher::new("brat-no-such-node-binary", "driver.js");
    let err = match launcher.launch().await {
        Ok(_) => panic!("launch should fail without a node binary"),
        Err(e) => e,
    };
    assert!(matches!(err, BratError::EngineUnavailable(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires node and playwright with chromium installed"]
async fn test_playwright_roundtrip() {
    let launcher = PlaywrightLauncher::new("node", SCRIPT_NAME);
    let engine = launcher.launch().await.expect("Failed to launch");
    let mut page = engine
        .new_page(Viewport::new(400, 300))
        .await
        .expect("Failed to open page");
    page.goto("data:text/html,<input id='t'><div id='o' style='width:120px;height:80px'>x</div>")
        .await
        .unwrap();
    page.fill("#t", "hello").await.unwrap();
    page.wait_for_render().await.unwrap();
    let bbox = page.bounding_box("#o").await.unwrap().expect("box");
    assert_eq!(bbox.width, 120.0);
    let png = page.screenshot(bbox).await.unwrap();
    assert_eq!(&png[1..4], b"PNG");
    assert!(page.click("#missing").await.is_err());
    page.close().await.unwrap();
    engine.close().await.unwrap();
}
