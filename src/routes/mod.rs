/*!
 * Routes Module
 *
 * API route definitions.
 */

pub mod api_v1;

pub use api_v1::create_api_v1_routes;
