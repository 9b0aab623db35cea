mod api;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

// Internal imports
use crate::api::{
    AppError, AskRequest, AskResponse, CardQuery, DeckQuery, RecommendQuery,
};
use deckhand_core::llm::OpenAiAssistant;
use deckhand_core::moxfield::{self, DeckLookup, DeckRecord, MoxfieldClient};
use deckhand_core::router::QuestionRouter;
use deckhand_core::runtime::JobRunner;
use deckhand_core::scryfall::{CardLookup, CardRecord, ScryfallClient};
use deckhand_core::{Config, Error};

// 1. Application State
// `router` is only present when an assistant credential was configured.
#[derive(Clone)]
struct AppState {
    router: Option<QuestionRouter>,
    cards: Arc<dyn CardLookup>,
    decks: Arc<dyn DeckLookup>,
}

impl AppState {
    fn router(&self) -> Result<&QuestionRouter, AppError> {
        self.router
            .as_ref()
            .ok_or_else(|| Error::Configuration("OPENAI_API_KEY is not set".to_string()).into())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 2. Logging Setup
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("Deckhand Gateway Initializing...");

    // 3. Configuration, read once
    let config = Config::from_env().context("Failed to read configuration")?;

    // 4. Upstream clients
    let cards: Arc<dyn CardLookup> = Arc::new(
        ScryfallClient::new(&config.scryfall_url).context("Failed to build Scryfall client")?,
    );
    let decks: Arc<dyn DeckLookup> = Arc::new(
        MoxfieldClient::new(&config.moxfield_url).context("Failed to build Moxfield client")?,
    );

    let router = match &config.openai_api_key {
        Some(_) => {
            let assistant = OpenAiAssistant::new(&config).context("Failed to build assistant client")?;
            let runner = JobRunner::new(Arc::new(assistant), config.assistant_id.clone(), config.poll);
            Some(QuestionRouter::new(cards.clone(), runner, config.verify_concurrency))
        }
        None => {
            warn!("OPENAI_API_KEY is not set; /ask and /moxfield/recommend will fail.");
            None
        }
    };

    // 5. Bundle State
    let state = AppState {
        router,
        cards,
        decks,
    };

    // 6. Start Server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Gateway listening on {}...", addr);

    axum::serve(listener, app(state)).await.context("Server error")?;
    Ok(())
}

// 7. Define Routes
fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/ask", post(ask))
        .route("/card/{name}", get(card_by_path))
        .route("/scryfall/card", get(card_by_query))
        .route("/moxfield/recommend", get(recommend))
        .route("/moxfield/{id}", get(deck_by_path))
        .route("/proxy/moxfield/deck", get(deck_by_query))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- HANDLERS ---

async fn health_check() -> &'static str {
    "Deckhand Gateway: Operational"
}

async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    // Credential first, before the body is even looked at.
    let router = state.router()?;

    let Json(payload) = payload
        .map_err(|rejection| Error::Validation(format!("Invalid request body: {}", rejection.body_text())))?;

    let question = payload.question.unwrap_or_default();
    if question.trim().is_empty() {
        return Err(Error::Validation("The question cannot be empty.".to_string()).into());
    }

    let answer = router.answer(&question).await?;
    Ok(Json(AskResponse { answer }))
}

async fn card_by_path(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CardRecord>, AppError> {
    lookup_card(&state, &name).await
}

async fn card_by_query(
    State(state): State<AppState>,
    Query(query): Query<CardQuery>,
) -> Result<Json<CardRecord>, AppError> {
    lookup_card(&state, query.name.as_deref().unwrap_or_default()).await
}

async fn lookup_card(state: &AppState, name: &str) -> Result<Json<CardRecord>, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("A card name is required.".to_string()).into());
    }
    Ok(Json(state.cards.card_by_name(name).await?))
}

async fn deck_by_path(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeckRecord>, AppError> {
    lookup_deck(&state, &id).await
}

async fn deck_by_query(
    State(state): State<AppState>,
    Query(query): Query<DeckQuery>,
) -> Result<Json<DeckRecord>, AppError> {
    lookup_deck(&state, query.deck_id.as_deref().unwrap_or_default()).await
}

async fn lookup_deck(state: &AppState, raw_id: &str) -> Result<Json<DeckRecord>, AppError> {
    let deck_id = moxfield::parse_deck_id(raw_id)?;
    Ok(Json(state.decks.deck_by_id(&deck_id).await?))
}

async fn recommend(
    State(state): State<AppState>,
    Query(query): Query<RecommendQuery>,
) -> Result<Json<AskResponse>, AppError> {
    let router = state.router()?;
    let deck_id = moxfield::deck_id_from_url(query.url.as_deref().unwrap_or_default())?;

    let deck = state.decks.deck_by_id(&deck_id).await?;
    info!("Recommending changes for deck '{}' ({} cards)", deck.name, deck.mainboard.len());

    let answer = router.runner().run(&deck.recommendation_prompt()).await?;
    Ok(Json(AskResponse { answer }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::{IntoResponse, Response},
    };
    use deckhand_core::llm::RunStatus;
    use deckhand_core::mock::{ScriptedAssistant, StaticCards, StaticDecks};
    use deckhand_core::moxfield::DeckCard;
    use deckhand_core::PollPolicy;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Fixture {
        state: AppState,
        cards: Arc<StaticCards>,
        decks: Arc<StaticDecks>,
        assistant: Arc<ScriptedAssistant>,
    }

    fn fixture(assistant: Option<ScriptedAssistant>) -> Fixture {
        let cards = Arc::new(StaticCards::priced(&[("Black Lotus", "25000.00")]));
        let decks = Arc::new(StaticDecks::new(vec![(
            "abc123",
            DeckRecord {
                name: "Mono Black".to_string(),
                commanders: vec![DeckCard {
                    name: "K'rrik, Son of Yawgmoth".to_string(),
                    quantity: 1,
                }],
                mainboard: vec![DeckCard {
                    name: "Swamp".to_string(),
                    quantity: 30,
                }],
            },
        )]));
        let configured = assistant.is_some();
        let assistant = Arc::new(assistant.unwrap_or_else(|| ScriptedAssistant::replying("unused")));

        let router = configured.then(|| {
            let runner = JobRunner::new(
                assistant.clone(),
                "asst_test",
                PollPolicy {
                    interval: Duration::ZERO,
                    max_attempts: 3,
                },
            );
            QuestionRouter::new(cards.clone(), runner, 2)
        });

        Fixture {
            state: AppState {
                router,
                cards: cards.clone(),
                decks: decks.clone(),
            },
            cards,
            decks,
            assistant,
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn question(text: &str) -> Result<Json<AskRequest>, JsonRejection> {
        Ok(Json(AskRequest {
            question: Some(text.to_string()),
        }))
    }

    #[tokio::test]
    async fn ask_without_credential_is_500_and_makes_no_calls() {
        let f = fixture(None);

        let response = ask(State(f.state.clone()), question("price of Black Lotus"))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], api::CONFIGURATION_MESSAGE);
        assert_eq!(f.cards.calls(), 0);
        assert_eq!(f.assistant.calls(), 0);
    }

    #[tokio::test]
    async fn ask_with_blank_question_is_400() {
        let f = fixture(Some(ScriptedAssistant::replying("unused")));

        let response = ask(State(f.state.clone()), Ok(Json(AskRequest { question: None })))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ask(State(f.state.clone()), question("   "))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(f.assistant.calls(), 0);
    }

    #[tokio::test]
    async fn ask_returns_assistant_answer() {
        let f = fixture(Some(ScriptedAssistant::replying("Deathtouch kills.")));

        let response = ask(State(f.state.clone()), question("What is deathtouch?"))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["answer"], "Deathtouch kills.");
    }

    #[tokio::test]
    async fn ask_price_query_uses_card_lookup() {
        let f = fixture(Some(ScriptedAssistant::replying("unused")));

        let response = ask(State(f.state.clone()), question("price of Black Lotus"))
            .await
            .into_response();

        assert_eq!(json_body(response).await["answer"], "Black Lotus: USD $25000.00");
        assert_eq!(f.assistant.calls(), 0);
    }

    #[tokio::test]
    async fn ask_upstream_failure_is_generic_500() {
        let f = fixture(Some(ScriptedAssistant::unreachable()));

        let response = ask(State(f.state.clone()), question("What is deathtouch?"))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], api::UPSTREAM_MESSAGE);
    }

    #[tokio::test]
    async fn unknown_card_is_404() {
        let f = fixture(None);

        let response = card_by_path(State(f.state.clone()), Path("Blck Lotos".to_string()))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Card 'Blck Lotos' not found");
    }

    #[tokio::test]
    async fn card_query_projects_record() {
        let f = fixture(None);

        let response = card_by_query(
            State(f.state.clone()),
            Query(CardQuery {
                name: Some("black lotus".to_string()),
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["name"], "Black Lotus");
        assert_eq!(body["prices"]["usd"], "25000.00");
    }

    #[tokio::test]
    async fn card_query_without_name_is_400() {
        let f = fixture(None);

        let response = card_by_query(State(f.state.clone()), Query(CardQuery { name: None }))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(f.cards.calls(), 0);
    }

    #[tokio::test]
    async fn deck_lookup_validates_id() {
        let f = fixture(None);

        let response = deck_by_query(
            State(f.state.clone()),
            Query(DeckQuery {
                deck_id: Some("not/an/id".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(f.decks.calls(), 0);

        let response = deck_by_path(State(f.state.clone()), Path("abc123".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["name"], "Mono Black");

        let response = deck_by_path(State(f.state.clone()), Path("missing".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn recommend_runs_assistant_on_deck() {
        let f = fixture(Some(ScriptedAssistant::replying("Add Dark Ritual.")));

        let response = recommend(
            State(f.state.clone()),
            Query(RecommendQuery {
                url: Some("https://www.moxfield.com/decks/abc123".to_string()),
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["answer"], "Add Dark Ritual.");
        let prompts = f.assistant.prompts();
        assert!(prompts[0].contains("\"Mono Black\""));
        assert!(prompts[0].contains("30 Swamp"));
    }

    #[tokio::test]
    async fn recommend_rejects_foreign_urls() {
        let f = fixture(Some(ScriptedAssistant::replying("unused")));

        let response = recommend(
            State(f.state.clone()),
            Query(RecommendQuery {
                url: Some("https://example.com/decks/abc123".to_string()),
            }),
        )
        .await
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(f.decks.calls(), 0);
        assert_eq!(f.assistant.calls(), 0);
    }

    #[tokio::test]
    async fn stuck_assistant_run_is_504() {
        let f = fixture(Some(ScriptedAssistant::new(vec![RunStatus::InProgress], vec![])));

        let response = ask(State(f.state.clone()), question("What is deathtouch?"))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json_body(response).await["error"], api::TIMEOUT_MESSAGE);
        assert_eq!(f.assistant.polls(), 3);
    }

    // --- Through the route table ---

    async fn send(state: AppState, request: Request<Body>) -> Response {
        app(state).oneshot(request).await.unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_ask(content_type: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/ask");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn route_health() {
        let f = fixture(None);

        let response = send(f.state, get_request("/")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Deckhand Gateway: Operational");
    }

    #[tokio::test]
    async fn route_ask_without_credential_ignores_body() {
        let f = fixture(None);

        for request in [
            post_ask(None, ""),
            post_ask(Some("application/json"), r#"{"question": 5}"#),
            post_ask(Some("application/json"), "{not json"),
            post_ask(Some("application/json"), r#"{"question": "price of Black Lotus"}"#),
        ] {
            let response = send(f.state.clone(), request).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(json_body(response).await["error"], api::CONFIGURATION_MESSAGE);
        }
        assert_eq!(f.cards.calls(), 0);
        assert_eq!(f.assistant.calls(), 0);
    }

    #[tokio::test]
    async fn route_ask_bad_body_is_json_400() {
        let f = fixture(Some(ScriptedAssistant::replying("unused")));

        for request in [
            post_ask(None, r#"{"question": "hi"}"#),
            post_ask(Some("application/json"), r#"{"question": 5}"#),
            post_ask(Some("application/json"), r#"{"question": "  "}"#),
        ] {
            let response = send(f.state.clone(), request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(json_body(response).await["error"].is_string());
        }
        assert_eq!(f.assistant.calls(), 0);
    }

    #[tokio::test]
    async fn route_ask_answers() {
        let f = fixture(Some(ScriptedAssistant::replying("Deathtouch kills.")));

        let response = send(
            f.state.clone(),
            post_ask(Some("application/json"), r#"{"question": "What is deathtouch?"}"#),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["answer"], "Deathtouch kills.");
    }

    #[tokio::test]
    async fn route_card_by_path_decodes_name() {
        let f = fixture(None);

        let response = send(f.state.clone(), get_request("/card/Black%20Lotus")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["name"], "Black Lotus");

        let response = send(f.state.clone(), get_request("/card/Blck%20Lotos")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Card 'Blck Lotos' not found");
    }

    #[tokio::test]
    async fn route_card_by_query() {
        let f = fixture(None);

        let response = send(f.state.clone(), get_request("/scryfall/card?name=black%20lotus")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["prices"]["usd"], "25000.00");

        let response = send(f.state.clone(), get_request("/scryfall/card")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
        assert_eq!(f.cards.calls(), 1);
    }

    #[tokio::test]
    async fn route_recommend_is_not_a_deck_id() {
        let f = fixture(Some(ScriptedAssistant::replying("Add Dark Ritual.")));

        let response = send(
            f.state.clone(),
            get_request("/moxfield/recommend?url=https%3A%2F%2Fwww.moxfield.com%2Fdecks%2Fabc123"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["answer"], "Add Dark Ritual.");
        assert_eq!(f.decks.calls(), 1);
        assert_eq!(f.assistant.prompts().len(), 1);
    }

    #[tokio::test]
    async fn route_deck_variants() {
        let f = fixture(None);

        let response = send(f.state.clone(), get_request("/moxfield/abc123")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["commanders"][0]["name"], "K'rrik, Son of Yawgmoth");

        let response = send(f.state.clone(), get_request("/moxfield/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(f.state.clone(), get_request("/proxy/moxfield/deck?deckId=abc123")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["mainboard"][0]["quantity"], 30);

        let response = send(f.state.clone(), get_request("/proxy/moxfield/deck?deckId=bad%2Fid")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(f.decks.calls(), 3);
    }
}
