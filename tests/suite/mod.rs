mod commands;
mod interference;
mod streaming;
