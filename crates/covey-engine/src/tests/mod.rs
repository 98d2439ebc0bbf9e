//! Tests for the covey-engine crate.

mod helpers;
