//! Automated admiral that plays through the same ability engine as humans

use std::collections::{BTreeMap, BTreeSet};
use std::future::{ready, Future};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::ability::{begin_on_client, get_possible_abilities, ClientInput, PlayerAbilityType};
use super::event::PlayerAction;
use super::phase::GamePhase;
use super::pick::{is_valid_pick, PickRequest, PickResponse, PickType};
use super::ship::{ReactorSpec, ShipPowerMode};
use super::state::GameState;
use super::types::{ShipId, Side};

const LOCATION_ATTEMPTS: usize = 64;

/// Machine-chosen answers to the questions an ability asks
pub struct AiInput {
    state: GameState,
    rng: ChaCha8Rng,
    /// Power modes staged for this phase, one per ship
    staged_power: BTreeMap<ShipId, ShipPowerMode>,
}

impl AiInput {
    pub fn new(state: GameState, seed: u64) -> Self {
        Self {
            state,
            rng: ChaCha8Rng::seed_from_u64(seed),
            staged_power: BTreeMap::new(),
        }
    }

    pub fn set_state(&mut self, state: GameState) {
        self.state = state;
    }

    pub fn clear_staged(&mut self) {
        self.staged_power.clear();
    }

    fn choose_pick(&mut self, request: &PickRequest) -> Option<PickResponse> {
        match &request.pick_type {
            PickType::Ship { allowed_sides } => {
                let mut candidates: Vec<(u32, ShipId)> = self
                    .state
                    .ships
                    .values()
                    .filter(|ship| allowed_sides.contains(&ship.owner))
                    .filter(|ship| {
                        is_valid_pick(&self.state, request, &PickResponse::Ship { id: ship.id() })
                    })
                    .map(|ship| (ship.hull, ship.id()))
                    .collect();
                // finish off the weakest enemy, escort our own weakest ship
                candidates.sort();
                candidates.first().map(|(_, id)| PickResponse::Ship { id: *id })
            }
            PickType::Location { .. } => (0..LOCATION_ATTEMPTS)
                .map(|_| PickResponse::Location {
                    position: request.boundary.sample(&mut self.rng),
                })
                .find(|response| is_valid_pick(&self.state, request, response)),
        }
    }

    fn choose_power(
        &mut self,
        ship: ShipId,
        reactor: ReactorSpec,
        current: ShipPowerMode,
        max_transfer: Option<u32>,
    ) -> ShipPowerMode {
        if let Some(staged) = self.staged_power.get(&ship) {
            return *staged;
        }
        let mode = match max_transfer {
            None => {
                if reactor.check_allocation(&current).is_ok() {
                    current
                } else {
                    reactor.default_power_mode()
                }
            }
            // one unit from engines into weapons costs two units of transfer
            Some(max) if max >= 2 && current.engines > 1 => ShipPowerMode {
                weapons: current.weapons + 1,
                shields: current.shields,
                engines: current.engines - 1,
            },
            Some(_) => current,
        };
        self.staged_power.insert(ship, mode);
        mode
    }
}

impl ClientInput for AiInput {
    fn pick(&mut self, request: PickRequest) -> impl Future<Output = Option<PickResponse>> + Send {
        ready(self.choose_pick(&request))
    }

    fn power_mode(
        &mut self,
        ship: ShipId,
        reactor: ReactorSpec,
        current: ShipPowerMode,
        max_transfer: Option<u32>,
    ) -> impl Future<Output = Option<ShipPowerMode>> + Send {
        ready(Some(self.choose_power(ship, reactor, current, max_transfer)))
    }
}

/// Chooses the next action for an automated side
pub struct AiPlanner {
    side: Side,
    input: AiInput,
    phase: Option<GamePhase>,
    rejected: BTreeSet<PlayerAbilityType>,
    last: Option<PlayerAbilityType>,
}

impl AiPlanner {
    pub fn new(state: GameState, side: Side, seed: u64) -> Self {
        Self {
            side,
            input: AiInput::new(state, seed),
            phase: None,
            rejected: BTreeSet::new(),
            last: None,
        }
    }

    /// The server turned down the last action
    pub fn on_rejected(&mut self) {
        if let Some(ability) = self.last.take() {
            self.rejected.insert(ability);
        }
    }

    /// `None` while there is nothing to do until the state changes
    pub async fn next_action(&mut self, state: &GameState) -> Option<PlayerAction> {
        if self.phase != Some(state.phase) {
            self.phase = Some(state.phase);
            self.rejected.clear();
            self.input.clear_staged();
        }
        if state.ready == Some(self.side) {
            return None;
        }
        self.input.set_state(state.clone());

        let mut abilities: Vec<PlayerAbilityType> = get_possible_abilities(state, self.side)
            .into_iter()
            .filter(|ability| {
                !matches!(
                    ability,
                    PlayerAbilityType::UndeployShip { .. }
                        | PlayerAbilityType::ConfigurePower { .. }
                        | PlayerAbilityType::RecallStrikeCraft { .. }
                )
            })
            .filter(|ability| !self.rejected.contains(ability))
            .collect();

        let done = abilities
            .iter()
            .position(|ability| matches!(ability, PlayerAbilityType::DonePhase { .. }))
            .map(|index| abilities.remove(index));
        abilities.shuffle(&mut self.input.rng);

        for ability in abilities.into_iter().chain(done) {
            if let Some(data) = begin_on_client(state, self.side, &ability, &mut self.input).await {
                self.last = Some(ability.clone());
                return Some(PlayerAction::UseAbility { ability, data });
            }
            self.rejected.insert(ability);
        }
        None
    }
}
