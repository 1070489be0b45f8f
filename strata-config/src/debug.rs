#[derive(knuffel::Decode, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DebugConfig {
    #[knuffel(child)]
    pub force_animations: bool,
    #[knuffel(child)]
    pub disable_explicit_sync: bool,
    #[knuffel(child)]
    pub force_num_lock_evaluation: bool,
    #[knuffel(child)]
    pub dump_frames: bool,
}
