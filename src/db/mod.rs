/*!
 * Database Module
 *
 * PostgreSQL connection pool management using SQLx.
 */

pub mod pool;

pub use pool::create_pool;
