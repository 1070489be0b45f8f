#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct Effects {
    #[knuffel(children(name = "effect"))]
    pub effects: Vec<EffectConfig>,
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq, Eq)]
pub struct EffectConfig {
    #[knuffel(argument)]
    pub name: String,
    /// Position in the paint chain; lower values paint first.
    #[knuffel(child, unwrap(argument))]
    pub chain_position: Option<i32>,
    #[knuffel(child, unwrap(argument), default = true)]
    pub enabled: bool,
}

impl Effects {
    pub fn find(&self, name: &str) -> Option<&EffectConfig> {
        self.effects.iter().find(|effect| effect.name == name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.find(name).map_or(true, |effect| effect.enabled)
    }
}
