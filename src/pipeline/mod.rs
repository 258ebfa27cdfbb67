//! Pipeline stages for certificate rendering.
//!
//! Each submodule implements exactly one step. Everything up to the draw
//! plan is pure; only [`assemble`] touches pdfium.
//!
//! ## Data Flow
//!
//! ```text
//! assets ──▶ placement ──▶ format ──▶ overlay ──▶ assemble
//! (PDF+tick)  (key→x,y)    (dates,    (draw plan)  (pdfium, spawn_blocking)
//!                           signature)
//! ```
//!
//! 1. [`assets`]    — read and validate the template PDF and tick image once
//! 2. [`placement`] — per-revision coordinate tables and template profiles
//! 3. [`format`]    — turn raw record values into display strings
//! 4. [`overlay`]   — decide what goes where; replay the plan on a canvas
//! 5. [`assemble`]  — load the template, draw page one, serialise

pub mod assemble;
pub mod assets;
pub mod format;
pub mod overlay;
pub mod placement;
