// ng_demand - Natural gas demand index from api.weather.gov forecasts
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Population weighted location table bundled with the binary: one capital city per U.S. state.
const BUNDLED_US_STATES: &str = include_str!("../../data/us_states.json");

#[derive(Debug)]
pub enum RegionError {
    Io(io::Error),
    Parse(serde_json::Error),
    Empty,
    Duplicate(String),
    InvalidWeight(String, f64),
    InvalidCoordinate(String, f64, f64),
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "unable to read region table: {}", e),
            Self::Parse(e) => write!(f, "unable to parse region table: {}", e),
            Self::Empty => write!(f, "region table is empty"),
            Self::Duplicate(name) => write!(f, "duplicate region {}", name),
            Self::InvalidWeight(name, w) => write!(f, "invalid population weight {} for {}", w, name),
            Self::InvalidCoordinate(name, lat, lon) => write!(f, "invalid coordinate {},{} for {}", lat, lon, name),
        }
    }
}

impl error::Error for RegionError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // weather.gov redirects requests with more than four decimal places
        write!(f, "{:.4},{:.4}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub city: String,
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub weight: f64,
}

/// Static mapping of region to representative coordinate and population weight.
///
/// The table is loaded once per run and never mutated afterwards. Iteration order is the
/// order of the records in the source, which is also the order regions are fetched in.
#[derive(Debug, Clone)]
pub struct RegionTable {
    regions: Vec<Region>,
}

impl RegionTable {
    /// Load the location table that ships with `ng_demand`.
    pub fn bundled() -> Result<Self, RegionError> {
        Self::from_json(BUNDLED_US_STATES)
    }

    /// Load a location table from a JSON file containing a list of region records.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RegionError> {
        let contents = fs::read_to_string(path).map_err(RegionError::Io)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, RegionError> {
        let regions: Vec<Region> = serde_json::from_str(contents).map_err(RegionError::Parse)?;
        Self::new(regions)
    }

    pub fn new(regions: Vec<Region>) -> Result<Self, RegionError> {
        if regions.is_empty() {
            return Err(RegionError::Empty);
        }

        let mut seen = HashSet::new();
        for r in regions.iter() {
            if !seen.insert(r.name.as_str()) {
                return Err(RegionError::Duplicate(r.name.clone()));
            }

            if !r.weight.is_finite() || r.weight <= 0.0 {
                return Err(RegionError::InvalidWeight(r.name.clone(), r.weight));
            }

            let c = r.coordinate;
            if !(-90.0..=90.0).contains(&c.latitude) || !(-180.0..=180.0).contains(&c.longitude) {
                return Err(RegionError::InvalidCoordinate(r.name.clone(), c.latitude, c.longitude));
            }
        }

        Ok(RegionTable { regions })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn total_weight(&self) -> f64 {
        self.regions.iter().map(|r| r.weight).sum()
    }
}
