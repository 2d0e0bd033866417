//! ESPN NFL feed client.
//!
//! Talks to the unofficial site API: `scoreboard` for candidate-game listings
//! and `summary` for live per-game state. Payloads are loosely typed upstream,
//! so everything is parsed through defaulted optional fields and normalized
//! before it leaves this module.

use super::{
    FeedError, GameListing, GamePhase, GameSnapshot, GameStatus, ScoreFeed, TeamSide,
};
use async_trait::async_trait;
use chrono::{Days, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

const ESPN_API_BASE: &str = "https://site.api.espn.com/apis/site/v2/sports/football/nfl";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 200;
const UPCOMING_WINDOW_DAYS: u64 = 30;

pub struct EspnClient {
    client: Client,
    base_url: String,
}

impl EspnClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("gridpool/1.0 (Squares Pool Backend)")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: ESPN_API_BASE.to_string(),
        }
    }

    /// Point the client at a different host. Used by tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut c = Self::new();
        c.base_url = base_url.into();
        c
    }

    /// GET with bounded exponential-backoff retry.
    async fn fetch(&self, url: &str) -> Result<reqwest::Response, FeedError> {
        let mut backoff = INITIAL_BACKOFF_MS;

        for attempt in 0..MAX_RETRIES {
            match timeout(Duration::from_secs(10), self.client.get(url).send()).await {
                Ok(Ok(response)) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }
                    let status = response.status();
                    warn!("score feed returned {} for {} (attempt {})", status, url, attempt + 1);
                    if status.is_client_error() {
                        // 4xx will not improve on retry.
                        return Err(FeedError::Unavailable(format!(
                            "feed returned {} for {}",
                            status, url
                        )));
                    }
                }
                Ok(Err(e)) => {
                    warn!("score feed request failed (attempt {}): {}", attempt + 1, e);
                }
                Err(_) => {
                    warn!("score feed request timed out (attempt {})", attempt + 1);
                }
            }

            if attempt < MAX_RETRIES - 1 {
                debug!("retrying in {}ms", backoff);
                sleep(Duration::from_millis(backoff)).await;
                backoff = (backoff * 2).min(5_000);
            }
        }

        Err(FeedError::Unavailable(format!(
            "max retries exceeded for {}",
            url
        )))
    }

    async fn scoreboard(&self, date: &str) -> Result<Vec<RawEvent>, FeedError> {
        let url = format!("{}/scoreboard?dates={}", self.base_url, date);
        let response = self.fetch(&url).await?;
        let board: RawScoreboard = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(format!("scoreboard parse: {}", e)))?;
        Ok(board.events)
    }
}

impl Default for EspnClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScoreFeed for EspnClient {
    async fn game_snapshot(&self, game_id: &str) -> Result<GameSnapshot, FeedError> {
        let url = format!("{}/summary?event={}", self.base_url, game_id);
        let response = self.fetch(&url).await?;

        let raw: RawSummary = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(format!("summary parse: {}", e)))?;

        parse_summary(game_id, raw)
    }

    async fn upcoming_games(&self) -> Result<Vec<GameListing>, FeedError> {
        let mut games = Vec::new();
        let today = Utc::now().date_naive();

        for offset in 0..UPCOMING_WINDOW_DAYS {
            let date = today
                .checked_add_days(Days::new(offset))
                .unwrap_or(today)
                .format("%Y%m%d")
                .to_string();

            // A single bad day never sinks the whole listing.
            match self.scoreboard(&date).await {
                Ok(events) => games.extend(events.into_iter().filter_map(parse_listing)),
                Err(e) => warn!("skipping scoreboard date {}: {}", date, e),
            }
        }

        Ok(games)
    }
}

// ===== Raw feed shapes =====

#[derive(Debug, Deserialize)]
struct RawScoreboard {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    id: Option<String>,
    date: Option<String>,
    name: Option<String>,
    short_name: Option<String>,
    #[serde(default)]
    competitions: Vec<RawCompetition>,
}

#[derive(Debug, Deserialize)]
struct RawSummary {
    header: Option<RawHeader>,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    id: Option<String>,
    #[serde(default)]
    competitions: Vec<RawCompetition>,
}

#[derive(Debug, Deserialize)]
struct RawCompetition {
    date: Option<String>,
    #[serde(default)]
    competitors: Vec<RawCompetitor>,
    status: Option<RawStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompetitor {
    home_away: Option<String>,
    score: Option<String>,
    linescores: Option<Vec<RawLinescore>>,
    team: Option<RawTeam>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTeam {
    name: Option<String>,
    abbreviation: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLinescore {
    display_value: Option<String>,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStatus {
    display_clock: Option<String>,
    period: Option<u8>,
    #[serde(rename = "type")]
    kind: Option<RawStatusType>,
}

#[derive(Debug, Deserialize)]
struct RawStatusType {
    state: Option<String>,
    completed: Option<bool>,
    detail: Option<String>,
}

// ===== Normalization =====

fn parse_summary(game_id: &str, raw: RawSummary) -> Result<GameSnapshot, FeedError> {
    let header = raw
        .header
        .ok_or_else(|| FeedError::NotFound(game_id.to_string()))?;

    let competition = header
        .competitions
        .into_iter()
        .next()
        .ok_or_else(|| FeedError::NotFound(game_id.to_string()))?;

    let mut home = None;
    let mut away = None;
    for competitor in competition.competitors {
        match competitor.home_away.as_deref() {
            Some("home") => home = Some(parse_side(competitor)),
            Some("away") => away = Some(parse_side(competitor)),
            _ => {}
        }
    }

    let home = home.ok_or_else(|| FeedError::Malformed("missing home competitor".into()))?;
    let away = away.ok_or_else(|| FeedError::Malformed("missing away competitor".into()))?;

    let status = parse_status(competition.status);

    Ok(GameSnapshot {
        id: header.id.unwrap_or_else(|| game_id.to_string()),
        date: competition.date.unwrap_or_default(),
        home,
        away,
        status,
    })
}

fn parse_side(raw: RawCompetitor) -> TeamSide {
    let team = raw.team.unwrap_or(RawTeam {
        name: None,
        abbreviation: None,
        display_name: None,
    });

    let linescores = raw.linescores.map(|ls| {
        ls.iter()
            .map(|entry| {
                entry
                    .display_value
                    .as_deref()
                    .and_then(|v| v.parse::<u32>().ok())
                    .or_else(|| entry.value.map(|v| v as u32))
                    .unwrap_or(0)
            })
            .collect()
    });

    TeamSide {
        name: team.name.unwrap_or_default(),
        abbreviation: team.abbreviation.unwrap_or_default(),
        display_name: team.display_name.unwrap_or_default(),
        score: raw
            .score
            .as_deref()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0),
        linescores,
    }
}

fn parse_status(raw: Option<RawStatus>) -> GameStatus {
    let raw = match raw {
        Some(s) => s,
        None => {
            return GameStatus {
                period: 0,
                clock: "0:00".to_string(),
                phase: GamePhase::Pre,
                completed: false,
                detail: "Scheduled".to_string(),
            }
        }
    };

    let kind = raw.kind.unwrap_or(RawStatusType {
        state: None,
        completed: None,
        detail: None,
    });

    let phase = match kind.state.as_deref() {
        Some("in") => GamePhase::In,
        Some("post") => GamePhase::Post,
        _ => GamePhase::Pre,
    };

    GameStatus {
        period: raw.period.unwrap_or(0),
        clock: raw.display_clock.unwrap_or_else(|| "0:00".to_string()),
        phase,
        completed: kind.completed.unwrap_or(false),
        detail: kind.detail.unwrap_or_else(|| "Scheduled".to_string()),
    }
}

fn parse_listing(event: RawEvent) -> Option<GameListing> {
    let id = event.id?;
    let competition = event.competitions.into_iter().next()?;

    let mut home: Option<RawTeam> = None;
    let mut away: Option<RawTeam> = None;
    for competitor in competition.competitors {
        match competitor.home_away.as_deref() {
            Some("home") => home = competitor.team,
            Some("away") => away = competitor.team,
            _ => {}
        }
    }

    let pick = |t: &Option<RawTeam>, f: fn(&RawTeam) -> Option<String>, default: &str| {
        t.as_ref()
            .and_then(f)
            .unwrap_or_else(|| default.to_string())
    };

    Some(GameListing {
        id,
        name: event.name.unwrap_or_default(),
        short_name: event.short_name.unwrap_or_default(),
        date: event.date.unwrap_or_default(),
        home_team: pick(&home, |t| t.display_name.clone(), "Home"),
        away_team: pick(&away, |t| t.display_name.clone(), "Away"),
        home_abbr: pick(&home, |t| t.abbreviation.clone(), "HOME"),
        away_abbr: pick(&away, |t| t.abbreviation.clone(), "AWAY"),
    })
}
