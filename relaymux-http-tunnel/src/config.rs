/// Tunable knobs for the HTTP tunnel. Buffer size only affects how requests
/// are chunked on the wire (frontend -> backend); responses are chunked by
/// whatever the handler passes to `ResponseWriter::write`.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub body_stream_buffer_size: usize,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            body_stream_buffer_size: 4096,
        }
    }
}
