// src/models/mod.rs

pub mod assessment;
pub mod certificate;
pub mod question;
