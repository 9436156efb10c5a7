mod common;
mod detector;
