pub mod app;
mod draw;
mod photo;
