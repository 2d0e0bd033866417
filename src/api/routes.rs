use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::backup::{self, BoardBackup};
use crate::models::{
    Board, BoardStatus, PaymentConfig, PayoutType, QuarterPayouts, Square, Winner,
};
use crate::pool::{self, PoolError};
use crate::scoreboard::{FeedError, GameSnapshot, ScoreFeed};
use crate::store::{BoardStore, ClaimOutcome, NewBoard, NewPaymentConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<BoardStore>,
    pub feed: Arc<dyn ScoreFeed>,
}

/// Create the API router
pub fn create_router(store: Arc<BoardStore>, feed: Arc<dyn ScoreFeed>) -> Router {
    let state = AppState { store, feed };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/games/upcoming", get(get_upcoming_games))
        .route("/api/boards", get(list_boards).post(create_board))
        .route("/api/boards/archived", get(list_archived_boards))
        .route("/api/boards/import", post(import_board))
        .route(
            "/api/boards/:board_id",
            get(get_board).patch(update_board).delete(delete_board),
        )
        .route("/api/boards/:board_id/finalize", post(finalize_board))
        .route("/api/boards/:board_id/winners", post(update_winners))
        .route("/api/boards/:board_id/winners/debug", get(debug_winners))
        .route("/api/boards/:board_id/export", get(export_board))
        .route("/api/boards/:board_id/squares", put(upsert_square))
        .route(
            "/api/boards/:board_id/squares/:square_id",
            axum::routing::delete(clear_square),
        )
        .route("/api/squares", post(claim_squares))
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Candidate games for a new board
async fn get_upcoming_games(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let games = state.feed.upcoming_games().await?;
    Ok(Json(json!({ "games": games })))
}

/// Active boards with related records, optionally joined with live game data
async fn list_boards(
    State(state): State<AppState>,
    Query(params): Query<BoardListQuery>,
) -> Result<Json<BoardsResponse>, ApiError> {
    let include_game_data = params.include_game_data.unwrap_or(true);
    let boards = state.store.list_boards(false)?;

    let mut views = Vec::with_capacity(boards.len());
    for board in boards {
        views.push(board_view(&state, board, include_game_data).await?);
    }

    Ok(Json(BoardsResponse { boards: views }))
}

async fn list_archived_boards(
    State(state): State<AppState>,
) -> Result<Json<BoardsResponse>, ApiError> {
    let boards = state.store.list_boards(true)?;

    let mut views = Vec::with_capacity(boards.len());
    for board in boards {
        views.push(board_view(&state, board, false).await?);
    }

    Ok(Json(BoardsResponse { boards: views }))
}

/// Admin board creation
async fn create_board(
    State(state): State<AppState>,
    Json(payload): Json<CreateBoardRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_create(&payload).map_err(ApiError::BadRequest)?;

    let board = state.store.create_board(NewBoard {
        name: payload.name,
        game_id: payload.game_id,
        team_home: payload.team_home,
        team_away: payload.team_away,
        cost_per_square: payload.cost_per_square,
        payout_type: payload.payout_type,
        payouts: payload.payouts,
        payment: NewPaymentConfig {
            allow_cash: payload.allow_cash,
            allow_paypal: payload.allow_paypal,
            allow_venmo: payload.allow_venmo,
            paypal_username: payload.paypal_username.filter(|_| payload.allow_paypal),
            venmo_username: payload.venmo_username.filter(|_| payload.allow_venmo),
        },
    })?;

    Ok(Json(json!({ "success": true, "board": board })))
}

async fn get_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let board = load_board_or_404(&state, &board_id)?;
    let view = board_view(&state, board, false).await?;
    Ok(Json(json!({ "board": view })))
}

/// Admin edits of name and lifecycle status
async fn update_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Json(payload): Json<UpdateBoardRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(name) = &payload.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("Board name cannot be empty".into()));
        }
    }

    let board = state
        .store
        .update_board_meta(&board_id, payload.name.as_deref(), payload.status)?
        .ok_or_else(|| ApiError::NotFound(format!("Board {} not found", board_id)))?;

    let view = board_view(&state, board, false).await?;
    Ok(Json(json!({ "board": view })))
}

async fn delete_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete_board(&board_id)? {
        return Err(ApiError::NotFound(format!("Board {} not found", board_id)));
    }
    Ok(Json(json!({ "success": true })))
}

/// Reveal the digit assignment and close the board
async fn finalize_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (rows, cols) = pool::finalize_board(&state.store, &board_id)?;
    let board = load_board_or_404(&state, &board_id)?;

    Ok(Json(json!({
        "board": board,
        "row_numbers": rows,
        "col_numbers": cols,
    })))
}

/// Run one settlement pass against the live score feed.
///
/// Safe to poll on any cadence from any number of clients; `force=true` is
/// the admin full recompute and deletes settled winners first.
async fn update_winners(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(params): Query<WinnersQuery>,
) -> Result<Json<WinnersResponse>, ApiError> {
    let force = params.force.unwrap_or(false);
    let report =
        pool::trigger_resolution(&state.store, state.feed.as_ref(), &board_id, force).await?;

    Ok(Json(WinnersResponse {
        success: true,
        new_winner_count: report.new_winners.len(),
        winners: report.new_winners,
    }))
}

/// Diagnostic view of everything resolution would see
async fn debug_winners(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let board = load_board_or_404(&state, &board_id)?;

    let game = match state.feed.game_snapshot(&board.game_id).await {
        Ok(g) => Some(g),
        Err(e) => {
            warn!(board_id = %board_id, "debug view has no game data: {}", e);
            None
        }
    };

    let existing_winners = state.store.load_winners(&board_id)?;
    let claimed = state.store.claimed_square_count(&board_id)?;
    let completed_quarters = game.as_ref().map(|g| g.completed_quarters());

    Ok(Json(json!({
        "board": {
            "id": board.id,
            "name": board.name,
            "is_finalized": board.is_finalized,
            "row_numbers": board.row_numbers,
            "col_numbers": board.col_numbers,
        },
        "game_data": game,
        "completed_quarters": completed_quarters,
        "existing_winners": existing_winners,
        "claimed_square_count": claimed,
    })))
}

async fn export_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<Json<BoardBackup>, ApiError> {
    Ok(Json(backup::export_board(&state.store, &board_id)?))
}

async fn import_board(
    State(state): State<AppState>,
    Json(payload): Json<BoardBackup>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let board = backup::import_board(&state.store, payload)?;
    Ok(Json(json!({
        "success": true,
        "board_id": board.id,
        "message": "Board restored successfully",
    })))
}

/// Player claim of one or more cells on an open board
async fn claim_squares(
    State(state): State<AppState>,
    Json(payload): Json<ClaimSquaresRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let player_name = payload.player_name.trim();
    if player_name.is_empty() {
        return Err(ApiError::BadRequest("Player name is required".into()));
    }
    if payload.squares.is_empty() {
        return Err(ApiError::BadRequest("No squares requested".into()));
    }

    let board = load_board_or_404(&state, &payload.board_id)?;
    if board.status != BoardStatus::Open {
        return Err(ApiError::Pool(PoolError::BoardClosed(board.id)));
    }

    let cells = validate_cells(&payload.squares).map_err(ApiError::BadRequest)?;

    let outcome = state.store.claim_squares(
        &board.id,
        &cells,
        player_name,
        payload.payment_method.as_deref(),
    )?;

    match outcome {
        ClaimOutcome::Claimed(squares) => Ok(Json(json!({
            "success": true,
            "squares": squares,
        }))),
        ClaimOutcome::Taken(taken) => Err(ApiError::Pool(PoolError::SquaresTaken(taken))),
    }
}

/// Admin assignment/correction of one cell, upserting by coordinate
async fn upsert_square(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Json(payload): Json<UpsertSquareRequest>,
) -> Result<Json<Square>, ApiError> {
    let player_name = payload.player_name.trim();
    if player_name.is_empty() {
        return Err(ApiError::BadRequest("Player name is required".into()));
    }
    let cells = validate_cells(&[CellRef {
        row: payload.row,
        col: payload.col,
    }])
    .map_err(ApiError::BadRequest)?;

    load_board_or_404(&state, &board_id)?;

    let square = state.store.upsert_square(
        &board_id,
        cells[0].0,
        cells[0].1,
        player_name,
        payload.payment_method.as_deref(),
        payload.is_paid.unwrap_or(false),
    )?;

    Ok(Json(square))
}

/// Clear a cell back to unclaimed
async fn clear_square(
    State(state): State<AppState>,
    Path((board_id, square_id)): Path<(String, String)>,
) -> Result<Json<Square>, ApiError> {
    state
        .store
        .clear_square(&board_id, &square_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Square {} not found", square_id)))
}

// ===== Helpers =====

fn load_board_or_404(state: &AppState, board_id: &str) -> Result<Board, ApiError> {
    state
        .store
        .load_board(board_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Board {} not found", board_id)))
}

/// Assemble a board with its related records and, optionally, a live game
/// snapshot. Feed failures degrade to a null snapshot rather than failing
/// the whole response.
async fn board_view(
    state: &AppState,
    board: Board,
    include_game_data: bool,
) -> Result<BoardView, ApiError> {
    let squares = state.store.load_squares(&board.id)?;
    let winners = state.store.load_winners(&board.id)?;
    let payment_config = state.store.load_payment_config(&board.id)?;

    let game_data = if include_game_data {
        match state.feed.game_snapshot(&board.game_id).await {
            Ok(g) => Some(g),
            Err(e) => {
                warn!(board_id = %board.id, "no game data for board: {}", e);
                None
            }
        }
    } else {
        None
    };

    Ok(BoardView {
        board,
        squares,
        winners,
        payment_config,
        game_data,
    })
}

fn validate_cells(cells: &[CellRef]) -> Result<Vec<(u8, u8)>, String> {
    cells
        .iter()
        .map(|c| {
            if c.row > 9 || c.col > 9 {
                Err(format!("square ({}, {}) is outside the grid", c.row, c.col))
            } else {
                Ok((c.row, c.col))
            }
        })
        .collect()
}

fn validate_create(req: &CreateBoardRequest) -> Result<(), String> {
    if req.game_id.trim().is_empty()
        || req.name.trim().is_empty()
        || req.team_home.trim().is_empty()
        || req.team_away.trim().is_empty()
    {
        return Err("Missing required fields".to_string());
    }
    if !(req.cost_per_square > 0.0) {
        return Err("Cost per square must be positive".to_string());
    }
    if req.payout_type == PayoutType::Percentage && (req.payouts.total() - 100.0).abs() > 0.01 {
        return Err("Percentage payouts must total 100%".to_string());
    }
    if !req.allow_cash && !req.allow_paypal && !req.allow_venmo {
        return Err("At least one payment method must be enabled".to_string());
    }
    if req.allow_paypal && req.paypal_username.as_deref().map_or(true, |u| u.trim().is_empty()) {
        return Err("PayPal username is required when PayPal is enabled".to_string());
    }
    if req.allow_venmo && req.venmo_username.as_deref().map_or(true, |u| u.trim().is_empty()) {
        return Err("Venmo username is required when Venmo is enabled".to_string());
    }
    Ok(())
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct BoardListQuery {
    /// Attach a live game snapshot per board (defaults to true)
    include_game_data: Option<bool>,
}

#[derive(Deserialize)]
struct WinnersQuery {
    /// Delete settled winners and recompute every quarter from scratch
    force: Option<bool>,
}

#[derive(Deserialize)]
struct CreateBoardRequest {
    name: String,
    game_id: String,
    team_home: String,
    team_away: String,
    cost_per_square: f64,
    payout_type: PayoutType,
    payouts: QuarterPayouts,
    #[serde(default)]
    allow_cash: bool,
    #[serde(default)]
    allow_paypal: bool,
    #[serde(default)]
    allow_venmo: bool,
    paypal_username: Option<String>,
    venmo_username: Option<String>,
}

#[derive(Deserialize)]
struct UpdateBoardRequest {
    name: Option<String>,
    status: Option<BoardStatus>,
}

#[derive(Deserialize, Clone, Copy)]
struct CellRef {
    row: u8,
    col: u8,
}

#[derive(Deserialize)]
struct ClaimSquaresRequest {
    board_id: String,
    squares: Vec<CellRef>,
    player_name: String,
    payment_method: Option<String>,
}

#[derive(Deserialize)]
struct UpsertSquareRequest {
    row: u8,
    col: u8,
    player_name: String,
    payment_method: Option<String>,
    is_paid: Option<bool>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct BoardView {
    #[serde(flatten)]
    board: Board,
    squares: Vec<Square>,
    winners: Vec<Winner>,
    payment_config: Option<PaymentConfig>,
    game_data: Option<GameSnapshot>,
}

#[derive(Serialize)]
struct BoardsResponse {
    boards: Vec<BoardView>,
}

#[derive(Serialize)]
struct WinnersResponse {
    success: bool,
    new_winner_count: usize,
    winners: Vec<Winner>,
}

// ===== Error Handling =====

#[derive(Debug)]
enum ApiError {
    Pool(PoolError),
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::BoardNotFound(id) => ApiError::NotFound(format!("Board {} not found", id)),
            PoolError::Store(e) => ApiError::Internal(e),
            other => ApiError::Pool(other),
        }
    }
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        ApiError::Pool(PoolError::Feed(err))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Pool(err) => {
                let status = match err {
                    PoolError::AlreadyFinalized(_) | PoolError::NotFinalized(_) => {
                        StatusCode::CONFLICT
                    }
                    PoolError::SquaresTaken(_) => StatusCode::CONFLICT,
                    PoolError::BoardClosed(_) | PoolError::InvalidInput(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    PoolError::Feed(FeedError::NotFound(_)) => StatusCode::NOT_FOUND,
                    PoolError::Feed(_) => StatusCode::BAD_GATEWAY,
                    PoolError::BoardNotFound(_) => StatusCode::NOT_FOUND,
                    PoolError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
