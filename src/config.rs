//! Configuration utilities.

use crate::map::projection::GeoPoint;
use crate::map::tiles::TileIndex;
use anyhow::Context;
use clap::builder;
use clap::error::ErrorKind;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// User-agent sent when the map provider doesn't configure one. Tile servers
/// such as OpenStreetMap reject requests without a plausible user agent.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; ",
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Description of a web service providing tiles.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct MapProvider {
    /// Address of the HTTPS tile server, including the domain name and any
    /// sub-directories.
    pub server: String,
    /// Local sub-folder (relative to the root `--cache-directory`) where tiles
    /// for this provider should be cached.
    pub cache_folder: String,
    /// File extension to append to each tile request.
    ///
    /// A simple example is `.png`. Additionally, some services may require an
    /// access token parameter, provide higher-resolution tiles under a `@2x`
    /// suffix, etc.
    pub extension: String,
    /// Referer HTTP header to attach to each tile request.
    #[serde(default)]
    pub referer: Option<String>,
    /// User-agent HTTP header to attach to each tile request.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for MapProvider {
    /// The standard OpenStreetMap tile server.
    fn default() -> Self {
        Self {
            server: "tile.openstreetmap.org".to_owned(),
            cache_folder: "osm".to_owned(),
            extension: ".png".to_owned(),
            referer: None,
            user_agent: None,
        }
    }
}

impl MapProvider {
    /// Returns the URL of the given tile on this provider.
    pub fn tile_url(&self, index: &TileIndex) -> String {
        format!(
            "https://{server}/{z}/{x}/{y}{extension}",
            server = self.server,
            z = index.z,
            x = index.x,
            y = index.y,
            extension = self.extension
        )
    }

    /// Returns the user-agent to send, never empty.
    pub fn user_agent(&self) -> &str {
        match &self.user_agent {
            Some(user_agent) if !user_agent.trim().is_empty() => user_agent,
            _ => DEFAULT_USER_AGENT,
        }
    }

    /// Reads a map provider configuration from the given JSON file.
    fn read_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| {
            format!(
                "Failed to read map provider configuration from: {}",
                path.display()
            )
        })?;
        let reader = BufReader::new(file);
        let provider: Self = serde_json::from_reader(reader).with_context(|| {
            format!(
                "Failed to parse map provider configuration from: {}",
                path.display()
            )
        })?;

        Ok(provider)
    }
}

/// Helper struct to parse a [`MapProvider`] configuration directly from a Clap
/// argument.
#[derive(Clone)]
pub struct MapProviderParser;

impl builder::TypedValueParser for MapProviderParser {
    type Value = MapProvider;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        MapProvider::read_from_file(value).map_err(|e| {
            let arg_str = arg.map(|a| a.to_string());
            let msg = format!(
                "Failed to parse map provider configuration{}{}: {:#}\n",
                arg_str.map(|a| format!(" ({})", a)).unwrap_or_default(),
                value
                    .to_str()
                    .map(|f| format!(" from file `{}`", f))
                    .unwrap_or_default(),
                e
            );
            clap::Error::raw(ErrorKind::Io, msg).with_cmd(cmd)
        })
    }
}

impl builder::ValueParserFactory for MapProvider {
    type Parser = MapProviderParser;

    fn value_parser() -> Self::Parser {
        MapProviderParser
    }
}

/// A named place the map can be centered on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SavedLocation {
    /// Display name.
    pub name: &'static str,
    /// Coordinates of the place.
    pub point: GeoPoint,
}

/// Places available by name on the command line.
pub const SAVED_LOCATIONS: &[SavedLocation] = &[
    SavedLocation {
        name: "Tempe, AZ",
        point: GeoPoint {
            lat: 33.4251,
            lon: -111.9400,
        },
    },
    SavedLocation {
        name: "New York, NY",
        point: GeoPoint {
            lat: 40.7128,
            lon: -74.0060,
        },
    },
    SavedLocation {
        name: "San Francisco, CA",
        point: GeoPoint {
            lat: 37.7749,
            lon: -122.4194,
        },
    },
    SavedLocation {
        name: "London, UK",
        point: GeoPoint {
            lat: 51.5074,
            lon: -0.1278,
        },
    },
];

/// Finds a saved location by name, ignoring ASCII case.
pub fn find_location(name: &str) -> Option<&'static SavedLocation> {
    SAVED_LOCATIONS
        .iter()
        .find(|location| location.name.eq_ignore_ascii_case(name.trim()))
}

/// Adapter to parse a [`SavedLocation`] name directly from a Clap parameter.
#[derive(Clone)]
pub struct SavedLocationParser;

impl builder::TypedValueParser for SavedLocationParser {
    type Value = SavedLocation;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let name = value.to_string_lossy();
        find_location(&name).copied().ok_or_else(|| {
            let known: Vec<&str> = SAVED_LOCATIONS.iter().map(|l| l.name).collect();
            let msg = format!(
                "Unknown location `{name}`, expected one of: {}\n",
                known.join("; ")
            );
            clap::Error::raw(ErrorKind::InvalidValue, msg).with_cmd(cmd)
        })
    }
}

impl builder::ValueParserFactory for SavedLocation {
    type Parser = SavedLocationParser;

    fn value_parser() -> Self::Parser {
        SavedLocationParser
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_provider_url() {
        let provider = MapProvider::default();
        let index = TileIndex {
            z: 16,
            x: 12345,
            y: 6789,
        };
        assert_eq!(
            provider.tile_url(&index),
            "https://tile.openstreetmap.org/16/12345/6789.png"
        );
    }

    #[test]
    fn provider_user_agent_fallback() {
        let mut provider = MapProvider::default();
        assert!(provider.user_agent().starts_with("Mozilla/5.0"));
        provider.user_agent = Some("  ".to_owned());
        assert_eq!(provider.user_agent(), DEFAULT_USER_AGENT);
        provider.user_agent = Some("MyViewer/1.0".to_owned());
        assert_eq!(provider.user_agent(), "MyViewer/1.0");
    }

    #[test]
    fn provider_from_json() {
        let provider: MapProvider = serde_json::from_str(
            r#"{"server": "tiles.example.org/base", "cache_folder": "example", "extension": "@2x.png"}"#,
        )
        .unwrap();
        assert_eq!(provider.referer, None);
        assert_eq!(
            provider.tile_url(&TileIndex { z: 1, x: 0, y: 1 }),
            "https://tiles.example.org/base/1/0/1@2x.png"
        );
    }

    #[test]
    fn saved_locations_lookup() {
        let london = find_location("london, uk").unwrap();
        assert_eq!(london.point, GeoPoint::new(51.5074, -0.1278));
        assert!(find_location("Atlantis").is_none());
        assert_eq!(SAVED_LOCATIONS.len(), 4);
    }
}
