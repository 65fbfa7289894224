use crate::client::{RecipeService, Suggestion};
use crate::gateway::{
    CORS_HEADERS, CompletionReply, ErrorReply, Gateway, GatewayConfig, GatewayError,
    GatewayRequest,
};
use crate::prompt::display_date;
use crate::session::{RequestToken, SessionStore, SessionView, Slot};
use crate::upstream::{ChatCompletion, GroqClient};
use crate::view::{RecipeCard, RecipeModal, featured_card, result_cards};
use crate::{DEFAULT_RECIPE_COUNT, Difficulty, Recipe};
use askama::Template;
use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State, rejection::BytesRejection},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{any, get, post},
};
use chrono::Local;
use cookie::{Cookie, SameSite};
use serde::Deserialize;
use serde_json::json;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, error, info, warn};
use utoipa::OpenApi;

pub const SESSION_COOKIE: &str = "iluto_session";
pub const GATEWAY_PATH: &str = "/api/groq-proxy";
/// Largest gateway request body read; anything bigger is an invalid prompt.
pub const GATEWAY_BODY_LIMIT: usize = 1024 * 1024;
/// Seconds between reloads while the featured dish is still being generated.
const LOADING_REFRESH_SECS: u32 = 2;

pub type SharedState<C> = Arc<AppState<C>>;

pub struct AppState<C> {
    pub gateway: Arc<Gateway<C>>,
    pub recipes: RecipeService<Arc<Gateway<C>>>,
    pub sessions: SessionStore,
    pub base_url: String,
}

impl<C: ChatCompletion> AppState<C> {
    pub fn new(gateway: Gateway<C>, recipe_count: usize, base_url: impl Into<String>) -> Self {
        let gateway = Arc::new(gateway);
        Self {
            recipes: RecipeService::new(Arc::clone(&gateway)).with_count(recipe_count),
            gateway,
            sessions: SessionStore::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Chrome {
    body_class: &'static str,
    main_class: &'static str,
    card_class: &'static str,
    eyebrow_class: &'static str,
    headline_class: &'static str,
    lede_class: &'static str,
    section_class: &'static str,
    muted_class: &'static str,
    button_class: &'static str,
    input_class: &'static str,
    chip_class: &'static str,
    notice_class: &'static str,
    grid_class: &'static str,
}

impl Default for Chrome {
    fn default() -> Self {
        Self {
            body_class: "bg-gradient-to-br from-orange-50 via-white to-pink-50 text-slate-900",
            main_class: "min-h-screen flex flex-col items-center justify-start py-10 px-4",
            card_class: "max-w-6xl w-full space-y-8",
            eyebrow_class: "uppercase tracking-wide text-sm text-orange-600",
            headline_class: "text-4xl font-extrabold tracking-tight",
            lede_class: "text-lg text-slate-600",
            section_class: "text-2xl font-bold mb-4",
            muted_class: "text-slate-500 italic",
            button_class: "inline-flex items-center rounded-md bg-orange-500 px-4 py-2 text-white font-semibold shadow hover:bg-orange-600 disabled:opacity-50 transition-colors",
            input_class: "flex-1 rounded-md border border-slate-300 px-3 py-2",
            chip_class: "inline-flex items-center gap-2 rounded-full bg-orange-100 px-3 py-1 text-orange-800",
            notice_class: "flex items-center justify-between rounded-md border border-amber-300 bg-amber-50 px-4 py-3 text-amber-900",
            grid_class: "grid gap-6 sm:grid-cols-2 lg:grid-cols-3",
        }
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub enable_openapi: bool,
    pub base_url: String,
    pub recipes_per_search: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_openapi: true,
            base_url: "http://127.0.0.1:8080".to_string(),
            recipes_per_search: DEFAULT_RECIPE_COUNT,
        }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(config: WebConfig, gateway: GatewayConfig) -> Result<(), WebError> {
    if gateway.api_key.is_none() {
        warn!("no upstream API key configured; the gateway will answer 500 until one is set");
    }
    let client = GroqClient::new(gateway.endpoint.clone());
    info!(?gateway, "Gateway configured");
    let state = Arc::new(AppState::new(
        Gateway::new(gateway, client),
        config.recipes_per_search,
        config.base_url.clone(),
    ));
    let router = build_router(state, config.enable_openapi);
    info!(
        %config.addr,
        openapi = config.enable_openapi,
        base = %config.base_url,
        recipes = config.recipes_per_search,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

pub fn build_router<C: ChatCompletion + 'static>(state: SharedState<C>, openapi: bool) -> Router {
    let mut gateway = Router::new()
        .route(GATEWAY_PATH, any(gateway_proxy::<C>))
        .layer(DefaultBodyLimit::max(GATEWAY_BODY_LIMIT))
        .layer(CatchPanicLayer::custom(gateway_panic));
    for (name, value) in CORS_HEADERS {
        gateway = gateway.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    let mut router = Router::new()
        .route("/", get(home::<C>))
        .route("/ingredients", post(add_ingredient::<C>))
        .route("/ingredients/remove", post(remove_ingredient::<C>))
        .route("/search", post(search::<C>))
        .route("/notices/dismiss", post(dismiss_notice::<C>))
        .route("/healthz", get(health))
        .merge(gateway);
    if openapi {
        router = router.route("/api-docs/openapi.json", get(openapi_json));
    }
    router
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn gateway_proxy<C: ChatCompletion + 'static>(
    State(state): State<SharedState<C>>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let outcome = match body {
        Ok(body) => state.gateway.handle(&method, &body).await,
        Err(rejection) => {
            warn!(%rejection, "gateway request body rejected");
            state.gateway.handle(&method, &[]).await
        }
    };
    let status = outcome.status();
    match outcome.body() {
        Some(payload) => (status, Json(payload)).into_response(),
        None => status.into_response(),
    }
}

fn gateway_panic(_: Box<dyn Any + Send + 'static>) -> Response {
    error!("gateway handler panicked");
    let err = GatewayError::Internal;
    (err.status(), Json(err.reply())).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "iluto-web" }))
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "iLuto recipe gateway",
        description = "Relays recipe prompts to the upstream chat-completion model."
    ),
    components(schemas(GatewayRequest, CompletionReply, ErrorReply, Recipe, Difficulty))
)]
struct ApiDoc;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[derive(Debug, Default, Deserialize)]
struct HomeParams {
    recipe: Option<usize>,
    featured: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct IngredientForm {
    ingredient: String,
}

#[derive(Debug, Deserialize)]
struct NoticeForm {
    slot: String,
}

async fn home<C: ChatCompletion + 'static>(
    State(state): State<SharedState<C>>,
    headers: HeaderMap,
    Query(params): Query<HomeParams>,
) -> Response {
    let (session, created) = state.sessions.resolve(session_cookie(&headers).as_deref());
    if let Some(token) = state.sessions.begin_featured(&session) {
        spawn_featured(Arc::clone(&state), session.clone(), token);
    }
    let view = state.sessions.view(&session).unwrap_or_default();
    let page = render_home(&state.base_url, &view, &params);
    with_session(Html(page).into_response(), &session, created)
}

fn spawn_featured<C: ChatCompletion + 'static>(
    state: SharedState<C>,
    session: String,
    token: RequestToken,
) {
    let today = Local::now().date_naive();
    tokio::spawn(async move {
        let generation = tokio::spawn({
            let state = Arc::clone(&state);
            async move { state.recipes.featured_dish(today).await }
        });
        let dish = match generation.await {
            Ok(dish) => dish,
            Err(err) => {
                error!(%err, %session, "featured dish task failed");
                Suggestion::featured_fallback()
            }
        };
        if !state.sessions.finish_featured(&session, token, dish) {
            debug!(%session, "featured dish arrived after the session moved on");
        }
    });
}

async fn add_ingredient<C: ChatCompletion + 'static>(
    State(state): State<SharedState<C>>,
    headers: HeaderMap,
    Form(form): Form<IngredientForm>,
) -> Response {
    let (session, created) = state.sessions.resolve(session_cookie(&headers).as_deref());
    let added = state
        .sessions
        .update_ingredients(&session, |list| list.add(&form.ingredient))
        .unwrap_or(false);
    debug!(added, ingredient = %form.ingredient, "ingredient submitted");
    with_session(back_home(), &session, created)
}

async fn remove_ingredient<C: ChatCompletion + 'static>(
    State(state): State<SharedState<C>>,
    headers: HeaderMap,
    Form(form): Form<IngredientForm>,
) -> Response {
    let (session, created) = state.sessions.resolve(session_cookie(&headers).as_deref());
    state
        .sessions
        .update_ingredients(&session, |list| list.remove(&form.ingredient));
    with_session(back_home(), &session, created)
}

async fn search<C: ChatCompletion + 'static>(
    State(state): State<SharedState<C>>,
    headers: HeaderMap,
) -> Response {
    let (session, created) = state.sessions.resolve(session_cookie(&headers).as_deref());
    match state.sessions.begin_search(&session) {
        Some((token, ingredients)) => {
            info!(ingredients = %ingredients.joined(), "searching recipes");
            let found = state.recipes.find_recipes(&ingredients).await;
            if !state.sessions.finish_search(&session, token, found) {
                debug!(%session, "search superseded by a newer one");
            }
        }
        None => debug!(%session, "search requested with no ingredients"),
    }
    with_session(back_home(), &session, created)
}

async fn dismiss_notice<C: ChatCompletion + 'static>(
    State(state): State<SharedState<C>>,
    headers: HeaderMap,
    Form(form): Form<NoticeForm>,
) -> Response {
    let (session, created) = state.sessions.resolve(session_cookie(&headers).as_deref());
    if let Some(slot) = Slot::parse(&form.slot) {
        state.sessions.dismiss_notice(&session, slot);
    }
    with_session(back_home(), &session, created)
}

fn back_home() -> Response {
    Redirect::to("/").into_response()
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

fn with_session(mut response: Response, session: &str, created: bool) -> Response {
    if !created {
        return response;
    }
    let cookie = Cookie::build((SESSION_COOKIE, session))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(err) => warn!(%err, "could not encode session cookie"),
    }
    response
}

struct NoticeView {
    slot: &'static str,
    message: &'static str,
}

fn render_home(base_url: &str, view: &SessionView, params: &HomeParams) -> String {
    let mut notices = Vec::new();
    if let Some(message) = view.featured_notice {
        notices.push(NoticeView {
            slot: "featured",
            message,
        });
    }
    if let Some(message) = view.search_notice {
        notices.push(NoticeView {
            slot: "search",
            message,
        });
    }
    let modal = match (params.featured, params.recipe) {
        (Some(true), _) => view.featured.as_ref().map(RecipeModal::new),
        (_, Some(index)) => view.recipes.get(index).map(RecipeModal::new),
        _ => None,
    };
    let template = HomeTemplate {
        chrome: Chrome::default(),
        version: env!("CARGO_PKG_VERSION"),
        base_url,
        today: display_date(Local::now().date_naive()),
        refresh_secs: LOADING_REFRESH_SECS,
        ingredients: view.ingredients.as_slice(),
        featured: view.featured.as_ref().map(featured_card),
        featured_loading: view.featured_loading,
        notices,
        cards: result_cards(&view.recipes),
        searching: view.searching,
        modal,
    };
    template
        .render()
        .unwrap_or_else(|err| render_error_page(err.to_string()))
}

fn render_error_page(message: impl Into<String>) -> String {
    let chrome = Chrome::default();
    let message = message.into();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>iLuto • Error</title>
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
  </head>
  <body class="{body_class}">
    <main class="{main_class}">
      <div class="{card_class}">
        <h1 class="{headline_class}">Something went wrong</h1>
        <p class="{lede_class}">{message}</p>
        <a href="/" class="{button_class}">Back to recipes</a>
      </div>
    </main>
  </body>
</html>"#,
        body_class = chrome.body_class,
        main_class = chrome.main_class,
        card_class = chrome.card_class,
        headline_class = chrome.headline_class,
        lede_class = chrome.lede_class,
        button_class = chrome.button_class,
        message = message,
    )
}

#[derive(Template)]
#[template(
    source = r#"{% macro recipe_card(card) %}
<article class="flex flex-col rounded-xl bg-white p-6 shadow hover:shadow-lg transition-shadow">
  <div class="flex items-start justify-between gap-3">
    <h3 class="text-xl font-bold">{{ card.recipe.name }}</h3>
    <span class="rounded-full px-2 py-1 text-xs font-semibold {{ card.recipe.tone.badge_class() }}">{{ card.recipe.difficulty }}</span>
  </div>
  <p class="mt-2 text-slate-600">{{ card.recipe.description }}</p>
  <p class="mt-3 text-sm text-slate-500">{{ card.recipe.cook_time }} · {{ card.recipe.servings }}</p>
  {% if card.preview.is_empty() %}
  <p class="mt-3 text-sm italic text-slate-500">No ingredients listed.</p>
  {% else %}
  <ul class="mt-3 flex flex-wrap gap-2 text-sm">
    {% for ingredient in card.preview %}
    <li class="rounded bg-slate-100 px-2 py-1">{{ ingredient }}</li>
    {% endfor %}
    {% match card.more_label() %}
    {% when Some with (label) %}
    <li class="rounded bg-slate-200 px-2 py-1 font-semibold">{{ label }}</li>
    {% when None %}
    {% endmatch %}
  </ul>
  {% endif %}
  <a href="{{ card.href }}" class="mt-4 font-semibold text-orange-600 hover:underline">View recipe</a>
</article>
{% endmacro %}<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    {% if featured_loading %}
    <meta http-equiv="refresh" content="{{ refresh_secs }}" />
    {% endif %}
    <title>iLuto • Recipes from what you have</title>
    <link rel="canonical" href="{{ base_url }}/" />
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }}">
        <header class="space-y-2">
          <p class="{{ chrome.eyebrow_class }}">iLuto v{{ version }} · {{ today }}</p>
          <h1 class="{{ chrome.headline_class }}">Cook something great with what you already have.</h1>
          <p class="{{ chrome.lede_class }}">Add the ingredients in your kitchen and get recipe ideas, plus a featured dish every day.</p>
        </header>

        {% for notice in notices %}
        <form method="post" action="/notices/dismiss" class="{{ chrome.notice_class }}" role="status">
          <input type="hidden" name="slot" value="{{ notice.slot }}" />
          <span>{{ notice.message }}</span>
          <button type="submit" class="font-bold" aria-label="Dismiss">×</button>
        </form>
        {% endfor %}

        <section id="featured">
          <h2 class="{{ chrome.section_class }}">Featured dish</h2>
          {% if featured_loading %}
          <p class="{{ chrome.muted_class }}">Preparing today's featured dish…</p>
          {% else %}
          {% match featured %}
          {% when Some with (card) %}
          {% call recipe_card(card) %}
          {% when None %}
          <p class="{{ chrome.muted_class }}">No featured dish today.</p>
          {% endmatch %}
          {% endif %}
        </section>

        <section id="ingredients" class="space-y-4">
          <h2 class="{{ chrome.section_class }}">Your ingredients</h2>
          <form method="post" action="/ingredients" class="flex gap-3">
            <input type="text" name="ingredient" placeholder="e.g. chicken, garlic, rice" class="{{ chrome.input_class }}" autofocus />
            <button type="submit" class="{{ chrome.button_class }}">Add</button>
          </form>
          {% if ingredients.is_empty() %}
          <p class="{{ chrome.muted_class }}">No ingredients yet. Add a few to get started.</p>
          {% else %}
          <ul class="flex flex-wrap gap-2">
            {% for ingredient in ingredients %}
            <li>
              <form method="post" action="/ingredients/remove" class="{{ chrome.chip_class }}">
                <span>{{ ingredient }}</span>
                <input type="hidden" name="ingredient" value="{{ ingredient }}" />
                <button type="submit" aria-label="Remove {{ ingredient }}">×</button>
              </form>
            </li>
            {% endfor %}
          </ul>
          {% endif %}
          <form method="post" action="/search">
            <button type="submit" class="{{ chrome.button_class }}" {% if ingredients.is_empty() || searching %}disabled{% endif %}>
              {% if searching %}Finding recipes…{% else %}Find recipes{% endif %}
            </button>
          </form>
        </section>

        {% if !cards.is_empty() %}
        <section id="results">
          <h2 class="{{ chrome.section_class }}">Recipe suggestions</h2>
          <div class="{{ chrome.grid_class }}">
            {% for card in cards %}
            {% call recipe_card(card) %}
            {% endfor %}
          </div>
        </section>
        {% endif %}
      </div>
    </main>

    {% match modal %}
    {% when Some with (modal) %}
    <div class="fixed inset-0 z-50 flex items-center justify-center bg-black/50 p-4" role="dialog" aria-modal="true">
      <div class="max-h-[90vh] w-full max-w-2xl overflow-y-auto rounded-xl bg-white p-8 shadow-xl space-y-4">
        <div class="flex items-start justify-between gap-4">
          <h2 class="text-3xl font-bold">{{ modal.recipe.name }}</h2>
          <a href="{{ modal.close_href }}" class="text-slate-500 hover:text-slate-900" aria-label="Close">Close</a>
        </div>
        <p class="text-slate-600">{{ modal.recipe.description }}</p>
        <dl class="grid grid-cols-3 gap-4 text-sm">
          <div><dt class="font-semibold">Cook time</dt><dd>{{ modal.recipe.cook_time }}</dd></div>
          <div><dt class="font-semibold">Servings</dt><dd>{{ modal.recipe.servings }}</dd></div>
          <div><dt class="font-semibold">Difficulty</dt><dd>{{ modal.recipe.difficulty }}</dd></div>
        </dl>
        <h3 class="text-xl font-bold">Ingredients</h3>
        {% if modal.recipe.has_ingredients() %}
        <ul class="list-disc pl-6">
          {% for ingredient in modal.recipe.ingredients %}
          <li>{{ ingredient }}</li>
          {% endfor %}
        </ul>
        {% else %}
        <p class="{{ chrome.muted_class }}">No ingredients listed.</p>
        {% endif %}
        <h3 class="text-xl font-bold">Instructions</h3>
        {% if modal.recipe.has_instructions() %}
        <ol class="list-decimal pl-6 space-y-2">
          {% for step in modal.recipe.instructions %}
          <li>{{ step }}</li>
          {% endfor %}
        </ol>
        {% else %}
        <p class="{{ chrome.muted_class }}">No instructions provided.</p>
        {% endif %}
      </div>
    </div>
    {% when None %}
    {% endmatch %}
  </body>
</html>"#,
    ext = "html"
)]
struct HomeTemplate<'a> {
    chrome: Chrome,
    version: &'static str,
    base_url: &'a str,
    today: String,
    refresh_secs: u32,
    ingredients: &'a [String],
    featured: Option<RecipeCard>,
    featured_loading: bool,
    notices: Vec<NoticeView>,
    cards: Vec<RecipeCard>,
    searching: bool,
    modal: Option<RecipeModal>,
}
