//! Command-line interface parsing for magdec
//!
//! This module handles parsing of CLI arguments using clap, including the
//! `LAT,LON` coordinate syntax shared by the subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::data::Coordinate;

/// Error types for CLI argument parsing
#[derive(Debug, Error, PartialEq)]
pub enum CliError {
    /// The argument is not of the form `LAT,LON`
    #[error("Invalid coordinate: '{0}'. Expected LAT,LON (e.g. 47.3,-122.3)")]
    MalformedCoordinate(String),

    /// The coordinate parsed but lies outside the valid ranges
    #[error(
        "Coordinate out of range: '{0}'. \
         Latitude must be within [-90, 90] and longitude within [-180, 180]"
    )]
    OutOfRange(String),
}

/// magdec - Look up magnetic declination with caching and a circuit breaker
#[derive(Parser, Debug)]
#[command(name = "magdec")]
#[command(about = "Magnetic declination lookup with caching and upstream protection")]
#[command(version)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Look up the declination for one or more coordinates
    ///
    /// Examples:
    ///   magdec lookup 47.3,-122.3
    ///   magdec lookup --api-key KEY 47.3,-122.3 -33.9,151.2
    Lookup {
        /// Coordinates as LAT,LON
        #[arg(
            required = true,
            value_name = "LAT,LON",
            allow_hyphen_values = true,
            value_parser = parse_coordinate_arg
        )]
        coordinates: Vec<Coordinate>,

        /// API key (overrides config and MAGDEC_API_KEY)
        #[arg(long, value_name = "KEY")]
        api_key: Option<String>,
    },

    /// Show the persisted circuit breaker state
    Status,

    /// Print the cache file used for a coordinate
    CachePath {
        #[arg(
            value_name = "LAT,LON",
            allow_hyphen_values = true,
            value_parser = parse_coordinate_arg
        )]
        coordinate: Coordinate,
    },
}

/// Parses a `LAT,LON` argument into a validated coordinate.
///
/// # Arguments
/// * `s` - The coordinate string from CLI
///
/// # Returns
/// * `Ok(Coordinate)` if both parts parse and are in range
/// * `Err(CliError)` otherwise
pub fn parse_coordinate_arg(s: &str) -> Result<Coordinate, CliError> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| CliError::MalformedCoordinate(s.to_string()))?;
    let lat = lat
        .trim()
        .parse::<f64>()
        .map_err(|_| CliError::MalformedCoordinate(s.to_string()))?;
    let lon = lon
        .trim()
        .parse::<f64>()
        .map_err(|_| CliError::MalformedCoordinate(s.to_string()))?;
    Coordinate::new(lat, lon).ok_or_else(|| CliError::OutOfRange(s.to_string()))
}
