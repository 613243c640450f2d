use crate::dispatcher::CommandDispatcher;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) dispatcher: CommandDispatcher,
}
