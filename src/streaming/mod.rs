//! Streaming response decoding
//!
//! Both backends frame their streaming output line-by-line: Ollama
//! emits one JSON object per line, llama.cpp emits Server-Sent-Events
//! `data:` lines. The decoder turns raw network chunks into complete
//! lines; the frame parsers turn lines into text fragments.

pub mod decoder;

pub use decoder::{llamacpp_frame, ollama_fragment, LineDecoder, SseFrame};
