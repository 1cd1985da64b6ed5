//! Stations and the lines that connect them.

use crate::network::Located;
use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable identifier of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId(pub i64);

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineId(pub i64);

impl std::fmt::Display for LineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stop on the network. Created once at load time; the position never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub position: Vector,
}

impl Station {
    pub fn new(id: i64, name: impl Into<String>, position: Vector) -> Self {
        Self {
            id: StationId(id),
            name: name.into(),
            position,
        }
    }

    /// Key extraction used by the route network.
    pub fn key(station: &Arc<Station>) -> StationId {
        station.id
    }
}

impl Located for Station {
    fn location(&self) -> Vector {
        self.position
    }
}

/// A fixed patrol route. Index order defines forward traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    pub stations: Vec<Arc<Station>>,
}

impl Line {
    pub fn new(id: i64, name: impl Into<String>, stations: Vec<Arc<Station>>) -> Self {
        Self {
            id: LineId(id),
            name: name.into(),
            stations,
        }
    }

    /// Position of the station on this line, if it is served.
    pub fn index_of(&self, station: StationId) -> Option<usize> {
        self.stations.iter().position(|s| s.id == station)
    }

    pub fn contains(&self, station: StationId) -> bool {
        self.index_of(station).is_some()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn first(&self) -> Option<&Arc<Station>> {
        self.stations.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_station() {
        let station = Station::new(1, "Station", Vector::new(2.0, 4.0));
        assert_eq!(station.name, "Station");
        assert_eq!(station.position.x, 2.0);
        assert_eq!(station.id, StationId(1));
    }

    #[test]
    fn test_line_lookup() {
        let a = Arc::new(Station::new(1, "A", Vector::new(0.0, 0.0)));
        let b = Arc::new(Station::new(2, "B", Vector::new(10.0, 0.0)));
        let line = Line::new(7, "Blue", vec![a.clone(), b]);

        assert_eq!(line.index_of(StationId(2)), Some(1));
        assert!(line.contains(StationId(1)));
        assert!(!line.contains(StationId(3)));
        assert_eq!(line.first(), Some(&a));
        assert_eq!(line.len(), 2);
    }
}
