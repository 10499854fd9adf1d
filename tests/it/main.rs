mod engine;
mod pipeline;
mod util;
