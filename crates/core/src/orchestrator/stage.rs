use std::fmt::{self, Display};

/// Where a conversation run currently is.
///
/// ```text
/// Seeded -> AwaitingModel -> DispatchingTools -> AwaitingModel -> ...
///                  |                  |
///                  +--> FinalStream <-+ (no tool calls / budget spent)
///                           |
///                           +--> Done
/// ```
///
/// Any error leaves the machine from whatever stage it is in, the run then
/// reports exactly one error event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) enum Stage {
    #[default]
    Seeded,
    AwaitingModel,
    DispatchingTools,
    FinalStream,
    Done,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Seeded => "seeded",
            Stage::AwaitingModel => "awaiting model",
            Stage::DispatchingTools => "dispatching tools",
            Stage::FinalStream => "final stream",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}
