// Test modules for portmapper

pub(crate) mod helpers;

mod gateway_tests;
mod natpmp_tests;
