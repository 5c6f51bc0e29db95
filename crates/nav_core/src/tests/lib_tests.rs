use std::collections::HashMap;

use axum::{extract::State, http::Uri, response::Html, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use super::*;

type SharedLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone)]
struct SiteState {
    routes: Arc<Mutex<HashMap<String, String>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

async fn serve_page(State(state): State<SiteState>, uri: Uri) -> (StatusCode, Html<String>) {
    let path = uri.path().to_string();
    state.requests.lock().push(path.clone());
    match state.routes.lock().get(&path) {
        Some(body) => (StatusCode::OK, Html(body.clone())),
        None => (StatusCode::NOT_FOUND, Html(String::new())),
    }
}

async fn spawn_site(routes: &[(&str, String)]) -> (Url, SiteState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = SiteState {
        routes: Arc::new(Mutex::new(
            routes
                .iter()
                .map(|(path, body)| (path.to_string(), body.clone()))
                .collect(),
        )),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new().fallback(serve_page).with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let origin = Url::parse(&format!("http://{addr}")).expect("origin");
    (origin, state)
}

fn page_html(template: &str, inner: &str) -> String {
    format!(
        "<html><body><div class=\"content\" data-template=\"{template}\">{inner}</div></body></html>"
    )
}

fn home_html() -> String {
    page_html("home", "<h1>home</h1><a href=\"/about\">About</a>")
}

fn about_html() -> String {
    page_html("about", "<h2>about</h2><a href=\"/\">Home</a>")
}

struct RecordingOverlay {
    log: SharedLog,
    show_permits: Option<Arc<Semaphore>>,
}

#[async_trait]
impl TransitionOverlay for RecordingOverlay {
    async fn show(&self) -> Result<()> {
        if let Some(permits) = &self.show_permits {
            let permit = permits.acquire().await.expect("semaphore closed");
            permit.forget();
        }
        self.log.lock().push("overlay.show".to_string());
        Ok(())
    }

    async fn hide(&self) -> Result<()> {
        self.log.lock().push("overlay.hide".to_string());
        Ok(())
    }
}

struct RecordingPage {
    template: String,
    log: SharedLog,
}

#[async_trait]
impl Page for RecordingPage {
    fn template(&self) -> &str {
        &self.template
    }

    async fn create(&self, content: &PageContent) -> Result<()> {
        self.log.lock().push(format!("page.create:{}", content.template));
        Ok(())
    }

    async fn animate_in(&self) -> Result<()> {
        self.log
            .lock()
            .push(format!("page.animate_in:{}", self.template));
        Ok(())
    }

    async fn animate_out(&self) -> Result<()> {
        self.log
            .lock()
            .push(format!("page.animate_out:{}", self.template));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingHistory {
    pushes: Mutex<Vec<String>>,
}

impl HistorySink for RecordingHistory {
    fn push(&self, url: &str) {
        self.pushes.lock().push(url.to_string());
    }
}

struct NoopLoader;

#[async_trait]
impl AssetLoader for NoopLoader {
    async fn load(&self, _src: &str) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    engine: Arc<NavigationEngine>,
    log: SharedLog,
    history: Arc<RecordingHistory>,
}

fn harness(origin: Url) -> Harness {
    harness_with(origin, None, true)
}

fn harness_with(origin: Url, show_permits: Option<Arc<Semaphore>>, desktop: bool) -> Harness {
    let log: SharedLog = Arc::new(Mutex::new(Vec::new()));
    let overlay = Arc::new(RecordingOverlay {
        log: Arc::clone(&log),
        show_permits,
    });
    let history = Arc::new(RecordingHistory::default());
    let mut pages: PageRegistry = HashMap::new();
    for template in ["home", "about"] {
        pages.insert(
            template.to_string(),
            Arc::new(RecordingPage {
                template: template.to_string(),
                log: Arc::clone(&log),
            }) as Arc<dyn Page>,
        );
    }
    let detection: Arc<dyn Detection> = if desktop {
        Arc::new(StaticDetection::desktop())
    } else {
        Arc::new(StaticDetection::touch())
    };
    let engine = NavigationEngine::new_with_dependencies(
        EngineOptions::new(origin).with_gate_hide_delay(Duration::ZERO),
        pages,
        overlay,
        Arc::clone(&history) as Arc<dyn HistorySink>,
        detection,
        Arc::new(NoopLoader),
        Arc::new(NoopChrome),
    );
    Harness {
        engine,
        log,
        history,
    }
}

fn index_of(log: &[String], entry: &str) -> usize {
    log.iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("missing log entry {entry:?} in {log:?}"))
}

async fn wait_for_log_entry(log: &SharedLog, entry: &str) {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if log.lock().iter().any(|e| e == entry) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for log entry {entry:?}"));
}

#[tokio::test]
async fn start_binds_initial_document_and_enters_once() {
    let (origin, _site) = spawn_site(&[]).await;
    let h = harness(origin);

    h.engine.start(&home_html()).await.expect("start");

    assert_eq!(h.engine.current_template().await, "home");
    assert_eq!(h.engine.bound_anchors().await, vec!["/about".to_string()]);
    let log = h.log.lock().clone();
    assert_eq!(log, vec!["page.create:home", "page.animate_in:home"]);
}

#[tokio::test]
async fn preload_progress_is_forwarded_then_completion_fires() {
    let (origin, _site) = spawn_site(&[]).await;
    let h = harness(origin);
    let mut events = h.engine.subscribe_events();

    let initial = page_html(
        "home",
        "<img src=\"/a.jpg\" /><img src=\"/b.jpg\" /><img src=\"/c.jpg\" />",
    );
    h.engine.start(&initial).await.expect("start");

    // The progress feed is a latest-value channel; intermediate readings
    // may coalesce, but the final 100 always lands.
    let mut percents: Vec<u8> = Vec::new();
    let mut completed = false;
    while !(completed && percents.last() == Some(&100)) {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("preload events stalled")
            .expect("event channel closed");
        match event {
            ShellEvent::PreloadProgress { percent } => percents.push(percent),
            ShellEvent::PreloadCompleted => completed = true,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert!(percents.iter().all(|&p| p <= 100));
}

#[tokio::test]
async fn navigation_swaps_template_attribute() {
    let (origin, _site) = spawn_site(&[("/about", about_html())]).await;
    let h = harness(origin);
    h.engine.start(&home_html()).await.expect("start");

    h.engine
        .navigate(NavigationRequest::user("/about"))
        .await
        .expect("navigate");

    assert_eq!(h.engine.current_template().await, "about");
    assert!(h.engine.content_markup().await.contains("<h2>about</h2>"));
    assert_eq!(h.engine.bound_anchors().await, vec!["/".to_string()]);
}

#[tokio::test]
async fn user_navigations_push_once_each_and_replays_never_push() {
    let (origin, _site) =
        spawn_site(&[("/", home_html()), ("/about", about_html())]).await;
    let h = harness(origin.clone());
    h.engine.start(&home_html()).await.expect("start");

    h.engine
        .navigate(NavigationRequest::user("/about"))
        .await
        .expect("first");
    h.engine
        .navigate(NavigationRequest::user("/"))
        .await
        .expect("second");
    h.engine.on_pop_state("/about").await.expect("replay");

    let pushes = h.history.pushes.lock().clone();
    assert_eq!(
        pushes,
        vec![
            origin.join("/about").expect("join").to_string(),
            origin.join("/").expect("join").to_string(),
        ]
    );
}

#[tokio::test]
async fn missing_route_falls_back_home_exactly_once() {
    let (origin, site) = spawn_site(&[("/", home_html())]).await;
    let h = harness(origin.clone());
    h.engine.start(&home_html()).await.expect("start");

    h.engine
        .navigate(NavigationRequest::user("/missing"))
        .await
        .expect("falls back");

    assert_eq!(h.engine.current_template().await, "home");
    assert_eq!(
        site.requests.lock().clone(),
        vec!["/missing".to_string(), "/".to_string()]
    );
    // The history entry reflects where we actually ended up.
    assert_eq!(
        h.history.pushes.lock().clone(),
        vec![origin.join("/").expect("join").to_string()]
    );
}

#[tokio::test]
async fn unreachable_home_is_a_bounded_failure() {
    let (origin, site) = spawn_site(&[]).await;
    let h = harness(origin);
    h.engine.start(&home_html()).await.expect("start");

    let err = h
        .engine
        .navigate(NavigationRequest::user("/missing"))
        .await
        .expect_err("must fail");

    match err {
        NavigationError::HomeUnreachable {
            status,
            fallback_status,
            ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(fallback_status, 404);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Exactly two fetches: the target and the single home fallback.
    assert_eq!(
        site.requests.lock().clone(),
        vec!["/missing".to_string(), "/".to_string()]
    );
    // The overlay never went up for a navigation that produced nothing.
    assert!(!h.log.lock().iter().any(|e| e == "overlay.show"));
    assert_eq!(h.engine.phase().await, NavPhase::Idle);
    assert!(!h.engine.cursor().snapshot().loading);
}

#[tokio::test]
async fn unknown_template_is_loud_and_leaves_live_content_untouched() {
    let (origin, _site) =
        spawn_site(&[("/weird", page_html("mystery", "<p>?</p>"))]).await;
    let h = harness(origin);
    h.engine.start(&home_html()).await.expect("start");

    let err = h
        .engine
        .navigate(NavigationRequest::user("/weird"))
        .await
        .expect_err("must fail");

    match err {
        NavigationError::UnknownTemplate { template } => assert_eq!(template, "mystery"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.engine.current_template().await, "home");
    assert!(h.engine.content_markup().await.contains("<h1>home</h1>"));
    assert!(!h.log.lock().iter().any(|e| e == "overlay.show"));
    assert!(h.history.pushes.lock().is_empty());
}

#[tokio::test]
async fn overlay_strictly_brackets_the_swap_and_entrance() {
    let (origin, _site) = spawn_site(&[("/about", about_html())]).await;
    let h = harness(origin);
    h.engine.start(&home_html()).await.expect("start");

    h.engine
        .navigate(NavigationRequest::user("/about"))
        .await
        .expect("navigate");

    let log = h.log.lock().clone();
    let show = index_of(&log, "overlay.show");
    let hide = index_of(&log, "overlay.hide");
    let create = index_of(&log, "page.create:about");
    let enter = index_of(&log, "page.animate_in:about");
    assert!(show < hide, "overlay must be fully shown before it hides: {log:?}");
    assert!(hide < create, "content swaps only after the overlay is gone: {log:?}");
    assert!(create < enter, "entrance runs on freshly bound content: {log:?}");

    // The exit animation is fire-and-forget; it lands eventually.
    wait_for_log_entry(&h.log, "page.animate_out:home").await;
}

#[tokio::test]
async fn mid_flight_clicks_are_dropped() {
    let (origin, site) = spawn_site(&[("/about", about_html()), ("/", home_html())]).await;
    let permits = Arc::new(Semaphore::new(0));
    let h = harness_with(origin, Some(Arc::clone(&permits)), true);
    h.engine.start(&home_html()).await.expect("start");
    let mut events = h.engine.subscribe_events();

    let engine = Arc::clone(&h.engine);
    let first = tokio::spawn(async move {
        engine.navigate(NavigationRequest::user("/about")).await
    });
    // Let the first navigation reach the overlay and park there.
    tokio::time::sleep(Duration::from_millis(30)).await;

    h.engine
        .navigate(NavigationRequest::user("/"))
        .await
        .expect("dropped requests are not errors");

    permits.add_permits(1);
    first.await.expect("join").expect("first navigation");

    let mut dropped = None;
    let mut settled = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            ShellEvent::NavigationDropped { url } => dropped = Some(url),
            ShellEvent::NavigationSettled { template } => settled.push(template),
            _ => {}
        }
    }
    assert_eq!(dropped.as_deref(), Some("/"));
    assert_eq!(settled, vec!["about".to_string()]);
    assert_eq!(h.engine.current_template().await, "about");
    // The dropped click never produced a fetch.
    assert_eq!(site.requests.lock().clone(), vec!["/about".to_string()]);
}

#[tokio::test]
async fn touch_cursor_is_revealed_while_loading_and_cleared_on_failure() {
    let (origin, _site) = spawn_site(&[]).await;
    let h = harness_with(origin, None, false);
    h.engine.start(&home_html()).await.expect("start");
    assert!(!h.engine.cursor().snapshot().visible);

    let _ = h
        .engine
        .navigate(NavigationRequest::user("/missing"))
        .await
        .expect_err("both routes 404");

    let snapshot = h.engine.cursor().snapshot();
    assert!(!snapshot.loading);
    assert!(!snapshot.visible);
    assert_eq!(h.engine.phase().await, NavPhase::Idle);
}

#[tokio::test]
async fn hover_targets_follow_the_latest_swap() {
    let (origin, _site) = spawn_site(&[("/about", about_html())]).await;
    let h = harness(origin);
    h.engine.start(&home_html()).await.expect("start");

    let cursor = h.engine.cursor();
    cursor.on_pointer_over("/about");
    assert!(cursor.snapshot().hovering);

    h.engine
        .navigate(NavigationRequest::user("/about"))
        .await
        .expect("navigate");

    // Old anchor died with the old subtree; the new one took its place.
    cursor.on_pointer_over("/about");
    assert!(!cursor.snapshot().hovering);
    cursor.on_pointer_over("/");
    assert!(cursor.snapshot().hovering);
    assert_eq!(cursor.generation(), 2);
}

#[tokio::test]
async fn transient_label_resets_after_navigation() {
    let (origin, _site) = spawn_site(&[("/about", about_html())]).await;
    let h = harness(origin);
    h.engine.start(&home_html()).await.expect("start");

    h.engine.cursor().set_label("Pause");
    h.engine
        .navigate(NavigationRequest::user("/about"))
        .await
        .expect("navigate");

    assert_eq!(h.engine.cursor().snapshot().label, cursor::DEFAULT_CURSOR_LABEL);
}

#[tokio::test]
async fn foreign_links_stay_with_the_browser() {
    let (origin, site) = spawn_site(&[("/about", about_html())]).await;
    let h = harness(origin.clone());
    h.engine.start(&home_html()).await.expect("start");

    let disposition = h
        .engine
        .on_link_activated("https://elsewhere.example/about")
        .await
        .expect("disposition");
    assert_eq!(disposition, LinkDisposition::Browser);
    assert!(site.requests.lock().is_empty());
    assert_eq!(h.engine.current_template().await, "home");

    // A fully qualified same-origin href is intercepted like a relative one.
    let absolute = origin.join("/about").expect("join").to_string();
    let disposition = h
        .engine
        .on_link_activated(&absolute)
        .await
        .expect("disposition");
    assert_eq!(disposition, LinkDisposition::Intercepted);
    assert_eq!(h.engine.current_template().await, "about");
}
