//! Deterministic scenarios for the metro harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// MS-001: One train between two stations, first trip only
    Shuttle,

    /// MS-002: The demo network with passengers for the full duration
    Demo,

    /// MS-003: Passengers at a line with no trains, sentiment decay only
    Stranded,

    /// MS-004: Tiny trains and heavy spawning, capacity pressure
    Rush,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Shuttle,
            ScenarioId::Demo,
            ScenarioId::Stranded,
            ScenarioId::Rush,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Shuttle => "shuttle",
            ScenarioId::Demo => "demo",
            ScenarioId::Stranded => "stranded",
            ScenarioId::Rush => "rush",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Shuttle => "S1 -> S2 over one waypoint: one departure, one arrival, stopped dead",
            ScenarioId::Demo => "10 stations, 3 lines, 5 trains, passengers spawning and riding",
            ScenarioId::Stranded => "No trains: sentiment follows 100 - 2*floor(t/5), one frustration each",
            ScenarioId::Rush => "Capacity 4 trains under a 250ms spawn rate: nobody rides over capacity",
        }
    }

    /// Minimum duration the scenario needs to say anything, in seconds.
    pub fn min_duration_secs(&self) -> f64 {
        match self {
            ScenarioId::Shuttle => 0.0,
            ScenarioId::Demo => 10.0,
            ScenarioId::Stranded => 135.0,
            ScenarioId::Rush => 10.0,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shuttle" | "ms-001" => Ok(ScenarioId::Shuttle),
            "demo" | "ms-002" => Ok(ScenarioId::Demo),
            "stranded" | "ms-003" => Ok(ScenarioId::Stranded),
            "rush" | "rush_hour" | "ms-004" => Ok(ScenarioId::Rush),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("MS-003".parse::<ScenarioId>(), Ok(ScenarioId::Stranded));
        assert!("chaos".parse::<ScenarioId>().is_err());
    }
}
