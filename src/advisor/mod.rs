//! Optional advisory service consulted before executing a baseline signal.
//!
//! The advisor can veto or annotate a proposed trade. It is strictly
//! advisory plumbing: when the service is disabled, offline, or failing,
//! trades are auto-approved with a note; the bot must keep working without
//! it. Risk-forced exits never consult the advisor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::Action;
use crate::stats::StatsSnapshot;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
const RECOMMEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct Recommendation {
    pub approve: bool,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Serialize)]
struct RecommendRequest<'a> {
    action: Action,
    price: f64,
    total_trades: u64,
    wins: u64,
    losses: u64,
    win_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
}

pub struct Advisor {
    client: reqwest::Client,
    api_url: String,
    enabled: bool,
}

impl Advisor {
    /// Create a disabled advisor that auto-approves everything.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: String::new(),
            enabled: false,
        }
    }

    /// Connect to the advisory service, degrading gracefully when it is
    /// unreachable: the bot runs in auto-approve mode rather than refusing
    /// to start.
    pub async fn connect(api_url: &str) -> Self {
        let api_url = api_url.trim_end_matches('/').to_string();
        let client = reqwest::Client::new();

        let healthy = match client
            .get(format!("{}/", api_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Advisor health check failed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Advisor unreachable, running in auto-approve mode");
                false
            }
        };

        if healthy {
            tracing::info!(url = %api_url, "Advisor connected");
        }

        Self {
            client,
            api_url,
            enabled: healthy,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Ask the service whether to execute a proposed trade.
    ///
    /// Any transport failure auto-approves with a note; a veto must be an
    /// explicit answer from the service, never an artifact of it being down.
    pub async fn recommend(
        &self,
        action: Action,
        price: f64,
        stats: &StatsSnapshot,
    ) -> Recommendation {
        if !self.enabled {
            return Recommendation {
                approve: true,
                note: "advisor offline".to_string(),
            };
        }

        let request = RecommendRequest {
            action,
            price,
            total_trades: stats.total_trades,
            wins: stats.wins,
            losses: stats.losses,
            win_rate: stats.win_rate,
            note: None,
        };

        let url = format!("{}/api/recommend", self.api_url);
        let response = self
            .client
            .post(&url)
            .timeout(RECOMMEND_TIMEOUT)
            .json(&request)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<Recommendation>().await {
                    Ok(rec) => {
                        tracing::info!(
                            approve = rec.approve,
                            note = %rec.note,
                            "Advisor recommendation for {:?} at {:.2}",
                            action,
                            price
                        );
                        rec
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Advisor response unparseable, auto-approving");
                        Recommendation {
                            approve: true,
                            note: "advisor response unparseable".to_string(),
                        }
                    }
                }
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Advisor error, auto-approving");
                Recommendation {
                    approve: true,
                    note: format!("advisor error {}", response.status()),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Advisor request failed, auto-approving");
                Recommendation {
                    approve: true,
                    note: "advisor request failed".to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> StatsSnapshot {
        StatsSnapshot {
            total_trades: 4,
            wins: 3,
            losses: 1,
            win_rate: 75.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_advisor_auto_approves() {
        let advisor = Advisor::disabled();
        let rec = advisor.recommend(Action::Buy, 43000.0, &stats()).await;
        assert!(rec.approve);
    }

    #[tokio::test]
    async fn test_connect_degrades_when_unreachable() {
        // Reserved TEST-NET-1 address: nothing listens there
        let advisor = Advisor::connect("http://192.0.2.1:1").await;
        assert!(!advisor.is_enabled());

        let rec = advisor.recommend(Action::Sell, 43000.0, &stats()).await;
        assert!(rec.approve);
    }

    #[tokio::test]
    async fn test_recommend_approve() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/api/recommend")
            .with_status(200)
            .with_body(r#"{"approve": true, "note": "momentum looks fine"}"#)
            .create_async()
            .await;

        let advisor = Advisor::connect(&server.url()).await;
        assert!(advisor.is_enabled());

        let rec = advisor.recommend(Action::Buy, 43000.0, &stats()).await;
        assert!(rec.approve);
        assert_eq!(rec.note, "momentum looks fine");
    }

    #[tokio::test]
    async fn test_recommend_veto() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/api/recommend")
            .with_status(200)
            .with_body(r#"{"approve": false, "note": "volatility spike"}"#)
            .create_async()
            .await;

        let advisor = Advisor::connect(&server.url()).await;
        let rec = advisor.recommend(Action::Sell, 43000.0, &stats()).await;
        assert!(!rec.approve);
        assert_eq!(rec.note, "volatility spike");
    }

    #[tokio::test]
    async fn test_server_error_auto_approves() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/api/recommend")
            .with_status(500)
            .create_async()
            .await;

        let advisor = Advisor::connect(&server.url()).await;
        let rec = advisor.recommend(Action::Buy, 43000.0, &stats()).await;
        assert!(rec.approve);
        assert!(rec.note.contains("advisor error"));
    }
}
