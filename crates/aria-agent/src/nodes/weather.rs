use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use aria_core::message::{Message, MessageKind, NodeKind, Provenance};
use aria_core::state::{TurnInput, TurnState, UNIFIED_NODE, WEATHER_NODE};
use aria_graph::NodeHandler;

use crate::error::AgentError;

/// Cities the transcript scan recognizes. Anything else falls back to the
/// default.
const KNOWN_CITIES: [&str; 12] = [
    "Tokyo", "Osaka", "Kyoto", "Nagoya", "Fukuoka", "Sapporo", "Sendai", "Hiroshima", "Yokohama",
    "London", "Paris", "New York",
];
const DEFAULT_CITY: &str = "Tokyo";

/// Weather for one day.
#[derive(Debug, Clone)]
pub struct DayForecast {
    pub condition: String,
    pub temperature_c: i32,
    pub humidity_pct: u32,
}

impl std::fmt::Display for DayForecast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}°C, {}% humidity",
            self.condition, self.temperature_c, self.humidity_pct
        )
    }
}

/// External weather lookup. The in-tree implementation is a deterministic
/// mock; a real HTTP provider slots in behind the same trait.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn forecast(&self, city: &str) -> Result<(DayForecast, DayForecast), AgentError>;
}

/// Deterministic mock: conditions derive from a hash of the city and the
/// current date, so repeated queries within a day agree with each other.
pub struct MockWeatherProvider;

#[async_trait]
impl WeatherProvider for MockWeatherProvider {
    async fn forecast(&self, city: &str) -> Result<(DayForecast, DayForecast), AgentError> {
        let today = chrono::Local::now().date_naive();
        Ok((mock_day(city, today, 0), mock_day(city, today, 1)))
    }
}

fn mock_day(city: &str, date: chrono::NaiveDate, offset: u64) -> DayForecast {
    const CONDITIONS: [&str; 7] = [
        "sunny",
        "cloudy",
        "rainy",
        "snowy",
        "sunny with some clouds",
        "cloudy with light rain",
        "rain clearing up",
    ];

    let mut hasher = DefaultHasher::new();
    city.hash(&mut hasher);
    date.hash(&mut hasher);
    offset.hash(&mut hasher);
    let h = hasher.finish();

    DayForecast {
        condition: CONDITIONS[(h % CONDITIONS.len() as u64) as usize].to_string(),
        temperature_c: ((h >> 8) % 35) as i32,
        humidity_pct: (30 + (h >> 16) % 60) as u32,
    }
}

/// Tool node: looks up the weather for the city named in the conversation
/// and hands the result back to the decision node.
pub struct WeatherNode {
    provider: Arc<dyn WeatherProvider>,
}

impl WeatherNode {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self { provider }
    }

    pub fn node_info() -> aria_core::state::NodeInfo {
        aria_core::state::NodeInfo {
            name: WEATHER_NODE.to_string(),
            description: "Looks up weather information for a city".to_string(),
            capabilities: vec![
                "weather lookup".to_string(),
                "forecast retrieval".to_string(),
            ],
            input_requirements: vec!["city_name".to_string()],
            output_fields: vec!["weather_info".to_string()],
        }
    }
}

#[async_trait]
impl NodeHandler for WeatherNode {
    async fn run(&self, mut state: TurnState, _input: &TurnInput) -> TurnState {
        let city = extract_city(&state);

        match self.provider.forecast(&city).await {
            Ok((today, tomorrow)) => {
                let weather_info =
                    format!("Weather for {city}:\nToday: {today}\nTomorrow: {tomorrow}");
                info!(%city, "weather lookup complete");

                state.messages.push(
                    Message::tool(
                        WEATHER_NODE,
                        weather_info.clone(),
                        Provenance::now(WEATHER_NODE, NodeKind::Service),
                    )
                    .with_extra(
                        "weather_info",
                        json!({
                            "city": city,
                            "today": today.to_string(),
                            "tomorrow": tomorrow.to_string(),
                        }),
                    ),
                );
                state.response = weather_info;
                state.success = true;
            }
            Err(e) => {
                let summary = format!("failed to fetch weather information: {e}");
                warn!(%city, error = %e, "weather lookup failed");

                state.messages.push(
                    Message::tool(
                        WEATHER_NODE,
                        summary.clone(),
                        Provenance::now(WEATHER_NODE, NodeKind::Service),
                    )
                    .with_extra("error", json!(e.to_string())),
                );
                state.response = summary.clone();
                state.success = false;
                state.error = Some(summary);
            }
        }

        // Control always returns to the decision node.
        state.next_node = UNIFIED_NODE.to_string();
        state
    }
}

/// Most recent human message naming a known city wins.
fn extract_city(state: &TurnState) -> String {
    for msg in state.messages.iter().rev() {
        if msg.kind != MessageKind::Human {
            continue;
        }
        let content = msg.text().to_lowercase();
        for city in KNOWN_CITIES {
            if content.contains(&city.to_lowercase()) {
                return city.to_string();
            }
        }
    }
    DEFAULT_CITY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::state::TurnFlags;
    use std::collections::BTreeMap;

    fn state_with_human(text: &str) -> TurnState {
        let mut state = TurnState::new(BTreeMap::new(), TurnFlags::default());
        state.messages.push(Message::human(
            text,
            Provenance::now(UNIFIED_NODE, NodeKind::UserFacing),
        ));
        state
    }

    #[test]
    fn extracts_the_named_city() {
        let state = state_with_human("what's the weather in Osaka tomorrow?");
        assert_eq!(extract_city(&state), "Osaka");
    }

    #[test]
    fn falls_back_to_the_default_city() {
        let state = state_with_human("what's the weather like?");
        assert_eq!(extract_city(&state), DEFAULT_CITY);
    }

    #[test]
    fn mock_forecast_is_deterministic_within_a_day() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let a = mock_day("Tokyo", date, 0);
        let b = mock_day("Tokyo", date, 0);
        assert_eq!(a.condition, b.condition);
        assert_eq!(a.temperature_c, b.temperature_c);
    }

    #[tokio::test]
    async fn success_appends_a_tool_message_and_routes_back() {
        let node = WeatherNode::new(Arc::new(MockWeatherProvider));
        let state = state_with_human("weather in Tokyo?");

        let result = node.run(state, &TurnInput::default()).await;

        assert!(result.success);
        assert_eq!(result.next_node, UNIFIED_NODE);
        let tool_msg = result.messages.last().expect("tool message");
        assert_eq!(tool_msg.kind, MessageKind::Tool);
        assert_eq!(tool_msg.tool_name.as_deref(), Some(WEATHER_NODE));
        assert!(tool_msg.tool_call_id.is_some());
        assert!(result.response.contains("Weather for Tokyo"));
    }

    #[tokio::test]
    async fn failure_still_routes_back_with_an_error_tool_message() {
        struct DownProvider;

        #[async_trait]
        impl WeatherProvider for DownProvider {
            async fn forecast(
                &self,
                _city: &str,
            ) -> Result<(DayForecast, DayForecast), AgentError> {
                Err(AgentError::Weather("service unreachable".to_string()))
            }
        }

        let node = WeatherNode::new(Arc::new(DownProvider));
        let state = state_with_human("weather in Tokyo?");

        let result = node.run(state, &TurnInput::default()).await;

        assert!(!result.success);
        assert_eq!(result.next_node, UNIFIED_NODE);
        let tool_msg = result.messages.last().expect("tool message");
        assert_eq!(tool_msg.kind, MessageKind::Tool);
        assert!(tool_msg.text().contains("service unreachable"));
    }
}
