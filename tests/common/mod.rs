#![allow(dead_code)]

pub(crate) mod chain;

pub(crate) mod file_db;

pub(crate) mod logging;

pub(crate) mod number_app;
