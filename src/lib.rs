//! Swagger Mock Server
//!
//! A programmable stand-in for HTTP APIs described by OpenAPI documents.
//! Serves registered mock calls when they match, synthesizes responses from
//! the API's declared examples when they don't, and hands out the OpenAPI
//! documents themselves.
//!
//! # Features
//!
//! - **Request Matching**: Match by query params, headers, and JSON body paths,
//!   with precision scoring and nth-match sequencing
//! - **Example Synthesis**: Build responses from OpenAPI examples and schemas
//!   when no mock call matches
//! - **Management API**: Register, inspect, and remove mock calls at runtime
//! - **Bulk Loading**: Preload mock calls from a folder of JSON files
//! - **Spec Passthrough**: Serve each API's OpenAPI document with servers
//!   pointing back at the mock
//!
//! # Example Configuration
//!
//! ```yaml
//! listen_addr: "0.0.0.0:5000"
//! api_definitions_folder: api-definitions
//! mock_calls_folder: mock-api-calls
//! apis:
//!   - api_name: petstore
//!     swagger_location: petstore.json
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod loader;
pub mod management;
pub mod matcher;
pub mod model;
pub mod registry;
pub mod server;
pub mod spec;
pub mod swagger;
pub mod synth;

pub use config::ServerConfig;
pub use model::{MockApiCall, MockApiCallDto};
pub use registry::MockRegistry;
