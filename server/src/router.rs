//! Protocol state machine for the shared canvas
//!
//! The router owns the resource pool, the session registry and the chaos
//! cycle. Each inbound event is applied to that state in one step and turned
//! into a list of [`Effect`]s for the network layer to carry out. The router
//! never touches a socket, so the whole protocol can be driven from tests.
//!
//! Placements are resolved here and broadcast to every session, sender
//! included, so all clients render the same resource at the same spot.

use crate::assets::AssetCounts;
use crate::pool::ResourcePool;
use crate::session_registry::SessionRegistry;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    ClientPacket, Identity, ResourceId, ServerPacket, SessionId, CHAOS_MAX_DURATION_MS,
    CHAOS_MIN_DURATION_MS,
};
use std::time::{Duration, Instant};

/// Work the network layer performs on behalf of the router
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver to a single session
    Send {
        session_id: SessionId,
        packet: ServerPacket,
    },
    /// Deliver to every connected session
    Broadcast { packet: ServerPacket },
    /// Call [`Router::chaos_timer_elapsed`] with `generation` after `after`
    ScheduleChaosEnd { generation: u64, after: Duration },
}

/// A running chaos cycle
#[derive(Debug, Clone)]
pub struct ChaosCycle {
    pub generation: u64,
    pub resource: Option<ResourceId>,
    pub duration: Duration,
    pub started_at: Instant,
}

impl ChaosCycle {
    fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.started_at.elapsed())
    }
}

pub struct Router {
    pool: ResourcePool,
    registry: SessionRegistry,
    counts: Option<AssetCounts>,
    chaos: Option<ChaosCycle>,
    chaos_generation: u64,
    max_sessions: usize,
    rng: StdRng,
}

impl Router {
    pub fn new(max_sessions: usize) -> Self {
        Self::with_rng(max_sessions, StdRng::from_entropy())
    }

    pub fn with_rng(max_sessions: usize, rng: StdRng) -> Self {
        Self {
            pool: ResourcePool::default(),
            registry: SessionRegistry::new(),
            counts: None,
            chaos: None,
            chaos_generation: 0,
            max_sessions,
            rng,
        }
    }

    /// Asset counts, or None until the inventory has been scanned
    pub fn resource_counts(&self) -> Option<AssetCounts> {
        self.counts
    }

    /// Records the asset counts and sizes the pool to the regular images
    pub fn set_resource_counts(&mut self, counts: AssetCounts) {
        self.counts = Some(counts);
        self.pool.initialize(counts.regular);
    }

    /// Registers a new session and builds its bootstrap payload
    ///
    /// Returns None when the server is at capacity; the session is not
    /// registered in that case.
    pub fn connect(&mut self, session_id: SessionId) -> Option<Vec<Effect>> {
        if self.registry.len() >= self.max_sessions {
            return None;
        }

        let peers = self.registry.snapshot();
        let cursors = self.registry.cursors();
        self.registry.register(session_id);

        let counts = self.counts.unwrap_or_default();
        let send = |packet: ServerPacket| Effect::Send { session_id, packet };

        let mut effects = vec![
            send(ServerPacket::Welcome { session_id }),
            send(ServerPacket::ResourceCounts {
                regular: counts.regular,
                peaceful: counts.peaceful,
            }),
            send(ServerPacket::PeerSnapshot { peers }),
        ];

        effects.extend(cursors.into_iter().map(|(peer, x, y)| {
            send(ServerPacket::CursorUpdate {
                session_id: peer,
                x,
                y,
            })
        }));

        if let Some(chaos) = &self.chaos {
            let remaining = chaos.remaining();
            if !remaining.is_zero() {
                effects.push(send(ServerPacket::ChaosStarted {
                    resource_id: chaos.resource,
                    duration_ms: remaining.as_millis() as u64,
                }));
            }
        }

        Some(effects)
    }

    /// Purges the session and tells the remaining peers it left
    ///
    /// The session's pinned resource stays used until the pool's next
    /// generation. Unknown sessions are a no-op.
    pub fn disconnect(&mut self, session_id: SessionId) -> Vec<Effect> {
        match self.registry.unregister(session_id) {
            Some(_) => vec![Effect::Broadcast {
                packet: ServerPacket::PeerLeft { session_id },
            }],
            None => Vec::new(),
        }
    }

    /// Applies one client event
    pub fn handle_packet(&mut self, session_id: SessionId, packet: ClientPacket) -> Vec<Effect> {
        if !self.registry.contains(session_id) {
            warn!(
                "Dropping {:?} from unregistered session {}",
                packet, session_id
            );
            return Vec::new();
        }

        match packet {
            ClientPacket::AnnounceIdentity { name, color } => {
                self.announce_identity(session_id, &name, &color)
            }
            ClientPacket::MoveCursor { x, y } => {
                self.registry.update_cursor(session_id, x, y);
                vec![Effect::Broadcast {
                    packet: ServerPacket::CursorUpdate { session_id, x, y },
                }]
            }
            ClientPacket::PlaceResource {
                x,
                y,
                is_continuation,
                use_existing_resource,
                is_chaos_variant,
                scale,
            } => {
                let resource_id = if is_chaos_variant {
                    self.chaos.as_ref().and_then(|chaos| chaos.resource)
                } else {
                    match self.resolve_resource(session_id, is_continuation, use_existing_resource)
                    {
                        Some(resource) => Some(resource),
                        None => {
                            debug!(
                                "No resources available, dropping placement from session {}",
                                session_id
                            );
                            return Vec::new();
                        }
                    }
                };

                vec![Effect::Broadcast {
                    packet: ServerPacket::Placement {
                        session_id,
                        x,
                        y,
                        resource_id,
                        scale,
                        is_continuation,
                        is_chaos_variant,
                    },
                }]
            }
            ClientPacket::EndGesture => {
                if let Some(resource) = self.registry.release_pin(session_id) {
                    debug!("Session {} released resource {}", session_id, resource);
                }
                Vec::new()
            }
            ClientPacket::ClearCanvasRequest => {
                info!("Session {} cleared the canvas", session_id);
                vec![Effect::Broadcast {
                    packet: ServerPacket::CanvasCleared,
                }]
            }
            ClientPacket::ChaosTrigger => self.start_chaos(session_id),
            ClientPacket::ChaosEnd => self.end_chaos(None),
        }
    }

    /// Ends the chaos cycle the timer was scheduled for, if still current
    pub fn chaos_timer_elapsed(&mut self, generation: u64) -> Vec<Effect> {
        self.end_chaos(Some(generation))
    }

    fn announce_identity(&mut self, session_id: SessionId, name: &str, color: &str) -> Vec<Effect> {
        let identity = match Identity::new(name, color) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Session {} announced an invalid identity: {}", session_id, e);
                return Vec::new();
            }
        };

        self.registry.set_identity(session_id, identity.clone());
        vec![Effect::Broadcast {
            packet: ServerPacket::IdentityUpdate {
                session_id,
                identity,
            },
        }]
    }

    /// Picks the resource for a placement
    ///
    /// A gesture start draws from the pool and pins the result. A
    /// continuation reuses the pin unless the client explicitly asks for a
    /// new resource with `useExistingResource: false`. A continuation with
    /// nothing pinned is treated as a fresh gesture.
    fn resolve_resource(
        &mut self,
        session_id: SessionId,
        is_continuation: bool,
        use_existing_resource: Option<bool>,
    ) -> Option<ResourceId> {
        if is_continuation && use_existing_resource.unwrap_or(true) {
            if let Some(resource) = self.registry.pinned_resource(session_id) {
                return Some(resource);
            }
            warn!(
                "Session {} continued a gesture with no pinned resource, starting a new one",
                session_id
            );
        }

        let resource = self.pool.draw(&mut self.rng)?;
        self.registry.pin_resource(session_id, resource);
        Some(resource)
    }

    fn start_chaos(&mut self, session_id: SessionId) -> Vec<Effect> {
        self.chaos_generation += 1;
        let generation = self.chaos_generation;

        let peaceful = self.counts.map(|c| c.peaceful).unwrap_or(0);
        let resource = (peaceful > 0).then(|| ResourceId(self.rng.gen_range(0..peaceful)));
        let duration_ms = self
            .rng
            .gen_range(CHAOS_MIN_DURATION_MS..=CHAOS_MAX_DURATION_MS);
        let duration = Duration::from_millis(duration_ms);

        if self.chaos.is_some() {
            info!("Chaos cycle restarted by session {}", session_id);
        }
        info!(
            "Chaos cycle {} started by session {} for {}ms",
            generation, session_id, duration_ms
        );

        self.chaos = Some(ChaosCycle {
            generation,
            resource,
            duration,
            started_at: Instant::now(),
        });

        vec![
            Effect::Broadcast {
                packet: ServerPacket::ChaosStarted {
                    resource_id: resource,
                    duration_ms,
                },
            },
            Effect::ScheduleChaosEnd {
                generation,
                after: duration,
            },
        ]
    }

    /// Ends the active cycle; `generation` restricts it to one cycle
    ///
    /// A client `chaos-end` with no cycle running is dropped rather than
    /// broadcast, so every `chaos-started` is answered by exactly one
    /// `chaos-ended`.
    fn end_chaos(&mut self, generation: Option<u64>) -> Vec<Effect> {
        let current = match &self.chaos {
            Some(chaos) => chaos.generation,
            None => {
                debug!("Chaos end requested with no active cycle");
                return Vec::new();
            }
        };

        if let Some(generation) = generation {
            if generation != current {
                debug!(
                    "Ignoring stale chaos timer {} (current cycle {})",
                    generation, current
                );
                return Vec::new();
            }
        }

        self.chaos = None;
        info!("Chaos cycle {} ended", current);
        vec![Effect::Broadcast {
            packet: ServerPacket::ChaosEnded,
        }]
    }

    pub fn is_chaos_active(&self) -> bool {
        self.chaos.is_some()
    }

    pub fn chaos(&self) -> Option<&ChaosCycle> {
        self.chaos.as_ref()
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}
