#![allow(dead_code)]

pub mod xlsx_fixture_builder;
