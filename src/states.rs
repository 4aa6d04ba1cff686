/// Where an agent is within one simulation tick. Cycles forever.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum TickPhase {
    #[default]
    Sensing,
    Deciding,
    Acting,
    Rewarding,
}
impl TickPhase {
    pub fn next(self) -> Self {
        match self {
            Self::Sensing => Self::Deciding,
            Self::Deciding => Self::Acting,
            Self::Acting => Self::Rewarding,
            Self::Rewarding => Self::Sensing,
        }
    }
}
