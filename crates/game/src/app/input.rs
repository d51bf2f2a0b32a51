use overworld_engine::{Direction, InputGate};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Quit,
}

const ACTION_COUNT: usize = 5;
const MOVE_PRIORITY: [InputAction; 4] = [
    InputAction::MoveUp,
    InputAction::MoveDown,
    InputAction::MoveLeft,
    InputAction::MoveRight,
];

impl InputAction {
    const fn index(self) -> usize {
        match self {
            InputAction::MoveUp => 0,
            InputAction::MoveDown => 1,
            InputAction::MoveLeft => 2,
            InputAction::MoveRight => 3,
            InputAction::Quit => 4,
        }
    }

    const fn direction(self) -> Option<Direction> {
        match self {
            InputAction::MoveUp => Some(Direction::Up),
            InputAction::MoveDown => Some(Direction::Down),
            InputAction::MoveLeft => Some(Direction::Left),
            InputAction::MoveRight => Some(Direction::Right),
            InputAction::Quit => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }

    pub(crate) fn clear(&mut self) {
        self.down = [false; ACTION_COUNT];
    }
}

/// Held actions plus the scroll latch. While disabled, movement reads as
/// released; quit still goes through.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlayerInput {
    states: ActionStates,
    enabled: bool,
}

impl Default for PlayerInput {
    fn default() -> Self {
        Self {
            states: ActionStates::default(),
            enabled: true,
        }
    }
}

impl PlayerInput {
    /// Replaces the held set with at most one action for this frame.
    pub(crate) fn hold_only(&mut self, action: Option<InputAction>) {
        self.states.clear();
        if let Some(action) = action {
            self.states.set(action, true);
        }
    }

    pub(crate) fn quit_requested(&self) -> bool {
        self.states.is_down(InputAction::Quit)
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// First held movement in up/down/left/right order.
    pub(crate) fn movement_direction(&self) -> Option<Direction> {
        if !self.enabled {
            return None;
        }
        MOVE_PRIORITY
            .into_iter()
            .find(|action| self.states.is_down(*action))
            .and_then(InputAction::direction)
    }
}

impl InputGate for PlayerInput {
    fn disable(&mut self) {
        self.enabled = false;
        debug!("player_input_disabled");
    }

    fn enable(&mut self) {
        self.enabled = true;
        debug!("player_input_enabled");
    }
}
