//! Graph node implementations: the unified decision node, the tool nodes it
//! routes to, and the terminator.

pub mod end;
pub mod memory_search;
pub mod unified;
pub mod weather;

pub use end::EndNode;
pub use memory_search::MemorySearchNode;
pub use unified::UnifiedResponseNode;
pub use weather::{MockWeatherProvider, WeatherNode, WeatherProvider};
