//! Helpers for tests that need a real, throwaway database.
pub mod prepare_env;
