#[derive(knuffel::DecodeScalar, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CompositingBackend {
    #[default]
    Opengl,
    Software,
}

#[derive(knuffel::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compositing {
    #[knuffel(child, unwrap(argument), default)]
    pub backend: CompositingBackend,
    #[knuffel(child)]
    pub prefer_gles: bool,
    #[knuffel(child, unwrap(argument), default = true)]
    pub explicit_sync: bool,
    /// Number of GPU render time samples kept for frame scheduling.
    #[knuffel(child, unwrap(argument), default = 10)]
    pub render_time_history: u16,
    /// Number of past frames kept in each output's damage journal.
    #[knuffel(child, unwrap(argument), default = 10)]
    pub damage_history: u16,
}

impl Default for Compositing {
    fn default() -> Self {
        Self {
            backend: CompositingBackend::default(),
            prefer_gles: false,
            explicit_sync: true,
            render_time_history: 10,
            damage_history: 10,
        }
    }
}
