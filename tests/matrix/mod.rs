//! Integration tests for named matrices and covariances

// Name-based algebra and sub-setting
mod named_matrix_tests;

// Covariance storage, inversion and conditioning
mod covariance_tests;
