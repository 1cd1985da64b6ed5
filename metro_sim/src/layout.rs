//! World layout - the construction inputs for a simulation.
//!
//! A layout is plain serde data (stations, edges with waypoints, lines,
//! makes and train assignments), loaded from JSON or taken from the
//! built-in [`WorldLayout::demo`]. [`WorldLayout::build`] validates every
//! cross reference and produces the shared route network.

use crate::error::SimError;
use metro_core::{Line, Make, Network, Station, StationId, StationNetwork, TrainAssignment, Vector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSpec {
    pub id: i64,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

/// Track between two stations. `waypoints` excludes both endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: i64,
    pub to: i64,
    #[serde(default)]
    pub waypoints: Vec<Vector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSpec {
    pub id: i64,
    pub name: String,

    /// Station ids in forward order
    pub stations: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSpec {
    pub name: String,
    pub make: String,
    pub line: i64,
    pub station: i64,

    /// Starting position, defaults to the station's
    #[serde(default)]
    pub position: Option<Vector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldLayout {
    pub stations: Vec<StationSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub lines: Vec<LineSpec>,
    #[serde(default)]
    pub makes: Vec<Make>,
    #[serde(default)]
    pub trains: Vec<TrainSpec>,
}

/// A validated layout, ready to be driven.
#[derive(Clone)]
pub struct BuiltLayout {
    /// Station table, owner of every `Arc<Station>`
    pub stations: BTreeMap<StationId, Arc<Station>>,
    pub network: Arc<StationNetwork>,
    pub lines: Vec<Line>,
    pub assignments: Vec<TrainAssignment>,
}

impl BuiltLayout {
    pub fn station_list(&self) -> Vec<Arc<Station>> {
        self.stations.values().cloned().collect()
    }
}

impl WorldLayout {
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolves every reference and builds the route network.
    pub fn build(&self) -> Result<BuiltLayout, SimError> {
        if self.stations.is_empty() {
            return Err(SimError::EmptyLayout);
        }

        let mut stations = BTreeMap::new();
        let mut network = Network::new(Station::key);
        for spec in &self.stations {
            let station = Arc::new(Station::new(spec.id, spec.name.clone(), Vector::new(spec.x, spec.y)));
            network.insert_vertex(Arc::clone(&station))?;
            stations.insert(station.id, station);
        }

        let lookup = |id: i64| -> Result<Arc<Station>, SimError> {
            stations.get(&StationId(id)).cloned().ok_or(SimError::UnknownStation(id))
        };

        for edge in &self.edges {
            let (a, b) = (lookup(edge.from)?, lookup(edge.to)?);
            network.insert_edge(&a, &b, edge.waypoints.clone())?;
        }

        let mut lines = Vec::with_capacity(self.lines.len());
        for spec in &self.lines {
            let members = spec
                .stations
                .iter()
                .map(|id| lookup(*id))
                .collect::<Result<Vec<_>, _>>()?;

            for pair in members.windows(2) {
                if network.are_connected(&pair[0], &pair[1]).is_err() {
                    warn!(line = %spec.name, from = %pair[0].name, to = %pair[1].name, "line uses a missing edge");
                }
            }
            lines.push(Line::new(spec.id, spec.name.clone(), members));
        }

        let makes: BTreeMap<&str, &Make> = self.makes.iter().map(|m| (m.name.as_str(), m)).collect();
        let mut assignments = Vec::with_capacity(self.trains.len());
        for spec in &self.trains {
            let make = makes
                .get(spec.make.as_str())
                .ok_or_else(|| SimError::UnknownMake(spec.make.clone()))?;
            let line = lines
                .iter()
                .find(|l| l.id.0 == spec.line)
                .cloned()
                .ok_or(SimError::UnknownLine(spec.line))?;
            let station = lookup(spec.station)?;

            assignments.push(TrainAssignment {
                name: spec.name.clone(),
                make: (*make).clone(),
                position: spec.position.unwrap_or(station.position),
                station,
                line,
            });
        }

        debug!(
            stations = stations.len(),
            edges = network.edge_count(),
            lines = lines.len(),
            trains = assignments.len(),
            "layout built"
        );

        Ok(BuiltLayout {
            stations,
            network: Arc::new(network),
            lines,
            assignments,
        })
    }

    /// Ten stations, three lines and five trains.
    pub fn demo() -> Self {
        let stations = [
            (1, 100.0, 250.0),
            (2, 150.0, 600.0),
            (3, 300.0, 550.0),
            (4, 300.0, 300.0),
            (5, 250.0, 150.0),
            (6, 450.0, 300.0),
            (7, 550.0, 550.0),
            (8, 700.0, 250.0),
            (9, 400.0, 700.0),
            (10, 500.0, 100.0),
        ]
        .into_iter()
        .map(|(id, x, y)| StationSpec {
            id,
            name: format!("Station {}", id),
            x,
            y,
        })
        .collect();

        let edge = |from: i64, to: i64, points: &[(f64, f64)]| EdgeSpec {
            from,
            to,
            waypoints: points.iter().map(|(x, y)| Vector::new(*x, *y)).collect(),
        };
        let edges = vec![
            edge(1, 2, &[(80.0, 400.0), (110.0, 520.0)]),
            edge(2, 3, &[(220.0, 600.0)]),
            edge(3, 9, &[(330.0, 650.0)]),
            edge(5, 4, &[(280.0, 220.0)]),
            edge(4, 6, &[]),
            edge(6, 8, &[(550.0, 250.0), (620.0, 230.0)]),
            edge(10, 6, &[(480.0, 200.0)]),
            edge(6, 7, &[(500.0, 420.0)]),
            edge(7, 3, &[(420.0, 560.0)]),
        ];

        let line = |id: i64, name: &str, stations: &[i64]| LineSpec {
            id,
            name: name.to_string(),
            stations: stations.to_vec(),
        };
        let lines = vec![
            line(1, "Red", &[1, 2, 3, 9]),
            line(2, "Blue", &[5, 4, 6, 8]),
            line(3, "Green", &[10, 6, 7, 3]),
        ];

        let makes = vec![
            Make::new("4-Legged-chu", "A type of fast train.", 0.003, 1.0),
            Make::new("1-Legged-chu", "Another type of fast train.", 0.004, 0.7).with_capacity(60),
        ];

        let train = |name: &str, make: &str, line: i64, station: i64| TrainSpec {
            name: name.to_string(),
            make: make.to_string(),
            line,
            station,
            position: None,
        };
        let trains = vec![
            train("Chu", "1-Legged-chu", 1, 1),
            train("Cha", "4-Legged-chu", 1, 9),
            train("Che", "1-Legged-chu", 2, 5),
            train("Chi", "4-Legged-chu", 3, 10),
            train("Cho", "1-Legged-chu", 3, 3),
        ];

        Self {
            stations,
            edges,
            lines,
            makes,
            trains,
        }
    }

    /// Two stations 100 units apart joined through a single waypoint, one train.
    pub fn shuttle() -> Self {
        Self {
            stations: vec![
                StationSpec { id: 1, name: "S1".to_string(), x: 0.0, y: 0.0 },
                StationSpec { id: 2, name: "S2".to_string(), x: 100.0, y: 0.0 },
            ],
            edges: vec![EdgeSpec {
                from: 1,
                to: 2,
                waypoints: vec![Vector::new(50.0, 0.0)],
            }],
            lines: vec![LineSpec {
                id: 1,
                name: "Shuttle".to_string(),
                stations: vec![1, 2],
            }],
            makes: vec![Make::new("Sprinter", "Test shuttle", 1.0, 4.0).with_capacity(20)],
            trains: vec![TrainSpec {
                name: "Shuttle 1".to_string(),
                make: "Sprinter".to_string(),
                line: 1,
                station: 1,
                position: None,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_layout_builds() {
        let built = WorldLayout::demo().build().unwrap();
        assert_eq!(built.stations.len(), 10);
        assert_eq!(built.lines.len(), 3);
        assert_eq!(built.assignments.len(), 5);
        assert_eq!(built.network.edge_count(), 9);

        // Every consecutive pair on every line has track
        for line in &built.lines {
            for pair in line.stations.windows(2) {
                assert!(built.network.are_connected(&pair[0], &pair[1]).is_ok());
            }
        }
    }

    #[test]
    fn test_layout_json_roundtrip() {
        let layout = WorldLayout::shuttle();
        let json = layout.to_json().unwrap();
        let parsed = WorldLayout::from_json(&json).unwrap();
        assert_eq!(parsed, layout);
    }

    #[test]
    fn test_minimal_json() {
        let json = r#"{
            "stations": [
                {"id": 1, "name": "A", "x": 0, "y": 0},
                {"id": 2, "name": "B", "x": 10, "y": 0}
            ],
            "edges": [{"from": 1, "to": 2}],
            "lines": [{"id": 1, "name": "L", "stations": [1, 2]}],
            "makes": [{"name": "M", "description": "", "acc_mag": 0.5, "top_speed": 2.0}],
            "trains": [{"name": "T", "make": "M", "line": 1, "station": 2}]
        }"#;
        let built = WorldLayout::from_json(json).unwrap().build().unwrap();
        let train = &built.assignments[0];
        assert_eq!(train.position, Vector::new(10.0, 0.0));
        assert_eq!(train.make.capacity, 100);
    }

    #[test]
    fn test_unknown_references() {
        let mut layout = WorldLayout::shuttle();
        layout.trains[0].make = "Ghost".to_string();
        assert!(matches!(layout.build(), Err(SimError::UnknownMake(_))));

        let mut layout = WorldLayout::shuttle();
        layout.edges[0].to = 99;
        assert!(matches!(layout.build(), Err(SimError::UnknownStation(99))));

        let mut layout = WorldLayout::shuttle();
        layout.trains[0].line = 5;
        assert!(matches!(layout.build(), Err(SimError::UnknownLine(5))));

        let mut layout = WorldLayout::shuttle();
        layout.stations.push(layout.stations[0].clone());
        assert!(matches!(layout.build(), Err(SimError::Network(_))));

        assert!(matches!(WorldLayout::default().build(), Err(SimError::EmptyLayout)));
    }
}
