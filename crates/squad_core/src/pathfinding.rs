//! Path planning adapter over an opaque grid-search collaborator.
//!
//! The search itself is a black box behind [`GridSearch`]: it is given a
//! grid snapshot and an acceptable-tile set, queues `find_path` requests
//! and answers each through its own callback when `calculate` runs.
//! [`AStarSearch`] is the stock collaborator, built on the `pathfinding`
//! crate.
//!
//! [`PathPlanner`] owns a search, tags every request with an id and the
//! requesting unit's generation, and funnels callbacks into an inbox that
//! the simulation drains at a fixed point in its tick. Outcomes therefore
//! never land in the middle of movement resolution.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

use ::pathfinding::prelude::astar;
use serde::{Deserialize, Serialize};

use crate::grid::{OccupancyGrid, TileCode, TileCoord, TileSet};
use crate::unit::UnitId;

/// Callback invoked once with the found tile sequence, or `None`.
///
/// A found sequence runs from the origin to the destination inclusive.
pub type PathCallback = Box<dyn FnOnce(Option<Vec<TileCoord>>)>;

/// One find-path request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathQuery {
    /// Tile the search starts from.
    pub origin: TileCoord,
    /// Tile the search must reach.
    pub destination: TileCoord,
    /// The requester's own anchor. It is `Occupied`, but the requester
    /// may step on it.
    pub own: Option<TileCoord>,
}

impl PathQuery {
    /// A request with no anchor of its own.
    #[must_use]
    pub const fn new(origin: TileCoord, destination: TileCoord) -> Self {
        Self {
            origin,
            destination,
            own: None,
        }
    }

    /// Let the search step on `anchor`.
    #[must_use]
    pub const fn with_own(mut self, anchor: TileCoord) -> Self {
        self.own = Some(anchor);
        self
    }
}

/// Grid search collaborator.
pub trait GridSearch {
    /// Replace the grid snapshot searched by later `calculate` calls.
    fn set_grid(&mut self, grid: &OccupancyGrid);

    /// Set which tile codes a path may step on.
    fn set_acceptable_tiles(&mut self, tiles: TileSet);

    /// Queue a request. The callback may fire now or during `calculate`.
    fn find_path(&mut self, query: PathQuery, callback: PathCallback);

    /// Resolve every queued request.
    fn calculate(&mut self);
}

/// A* search over 4-connected tiles with unit step cost.
pub struct AStarSearch {
    snapshot: Option<OccupancyGrid>,
    acceptable: TileSet,
    queue: VecDeque<(PathQuery, PathCallback)>,
    synchronous: bool,
}

impl std::fmt::Debug for AStarSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AStarSearch")
            .field("acceptable", &self.acceptable)
            .field("queued", &self.queue.len())
            .field("synchronous", &self.synchronous)
            .finish_non_exhaustive()
    }
}

impl Default for AStarSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl AStarSearch {
    /// A search that resolves requests during `calculate`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: None,
            acceptable: TileSet::EMPTY,
            queue: VecDeque::new(),
            synchronous: false,
        }
    }

    /// A search that resolves each request inside `find_path`.
    #[must_use]
    pub fn synchronous() -> Self {
        Self {
            synchronous: true,
            ..Self::new()
        }
    }

    /// Number of unresolved requests.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn search(&self, query: PathQuery) -> Option<Vec<TileCoord>> {
        let PathQuery { origin, destination, own } = query;
        let grid = self.snapshot.as_ref()?;
        if !grid.in_bounds(origin) {
            return None;
        }
        let reachable =
            destination == origin || Some(destination) == own || grid.is_traversable(destination, self.acceptable);
        if !reachable {
            return None;
        }

        astar(
            &origin,
            |&tile| {
                grid.passable_neighbors(tile, self.acceptable, own)
                    .map(|n| (n, 1_u32))
                    .collect::<Vec<_>>()
            },
            |&tile| tile.manhattan(destination),
            |&tile| tile == destination,
        )
        .map(|(tiles, _cost)| tiles)
    }
}

impl GridSearch for AStarSearch {
    fn set_grid(&mut self, grid: &OccupancyGrid) {
        match &mut self.snapshot {
            Some(snapshot) => snapshot.clone_from(grid),
            None => self.snapshot = Some(grid.clone()),
        }
    }

    fn set_acceptable_tiles(&mut self, tiles: TileSet) {
        self.acceptable = tiles;
    }

    fn find_path(&mut self, query: PathQuery, callback: PathCallback) {
        if self.synchronous {
            callback(self.search(query));
        } else {
            self.queue.push_back((query, callback));
        }
    }

    fn calculate(&mut self) {
        while let Some((query, callback)) = self.queue.pop_front() {
            callback(self.search(query));
        }
    }
}

/// Waypoints a unit still has to visit, origin excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TilePath {
    steps: VecDeque<TileCoord>,
}

impl TilePath {
    /// Build a path from explicit steps.
    pub fn from_steps(steps: impl IntoIterator<Item = TileCoord>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Convert a search result into a path.
    ///
    /// The leading origin tile is dropped. A result that is only the
    /// origin (a zero-distance request) keeps it, so the path still names
    /// its destination. An empty result yields `None`.
    #[must_use]
    pub fn from_search(origin: TileCoord, tiles: Vec<TileCoord>) -> Option<Self> {
        let mut steps: VecDeque<TileCoord> = tiles.into();
        if steps.is_empty() {
            return None;
        }
        if steps.len() > 1 && steps.front() == Some(&origin) {
            steps.pop_front();
        }
        Some(Self { steps })
    }

    /// Final tile, `None` for an empty path.
    #[must_use]
    pub fn destination(&self) -> Option<TileCoord> {
        self.steps.back().copied()
    }

    /// Next waypoint.
    #[must_use]
    pub fn front(&self) -> Option<TileCoord> {
        self.steps.front().copied()
    }

    /// Drop the next waypoint.
    pub fn pop_front(&mut self) -> Option<TileCoord> {
        self.steps.pop_front()
    }

    /// Remaining waypoint count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True once every waypoint has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterate remaining waypoints in order.
    pub fn iter(&self) -> impl Iterator<Item = &TileCoord> {
        self.steps.iter()
    }
}

/// Identifier handed out for each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// A resolved request, waiting to be applied by the simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOutcome {
    /// Request this answers.
    pub request: RequestId,
    /// Unit that asked.
    pub unit: UnitId,
    /// Unit generation at request time.
    pub generation: u64,
    /// Origin tile.
    pub origin: TileCoord,
    /// Destination tile.
    pub destination: TileCoord,
    /// Path found, or `None` if no route exists.
    pub path: Option<TilePath>,
}

/// Adapter between the simulation and a [`GridSearch`].
pub struct PathPlanner<S: GridSearch = AStarSearch> {
    search: S,
    next_request: u64,
    in_flight: usize,
    sender: Sender<PathOutcome>,
    inbox: Receiver<PathOutcome>,
}

impl<S: GridSearch> std::fmt::Debug for PathPlanner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathPlanner")
            .field("next_request", &self.next_request)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl PathPlanner<AStarSearch> {
    /// Planner for squad units over the stock search.
    #[must_use]
    pub fn for_units() -> Self {
        Self::new(AStarSearch::new(), TileSet::UNIT)
    }

    /// Planner for enemies over the stock search.
    #[must_use]
    pub fn for_enemies() -> Self {
        Self::new(AStarSearch::new(), TileSet::ENEMY)
    }
}

impl<S: GridSearch> PathPlanner<S> {
    /// Wrap a search configured with `acceptable` tiles.
    pub fn new(mut search: S, acceptable: TileSet) -> Self {
        search.set_acceptable_tiles(acceptable);
        let (sender, inbox) = mpsc::channel();
        Self {
            search,
            next_request: 0,
            in_flight: 0,
            sender,
            inbox,
        }
    }

    /// Queue a path request for a unit standing on `anchor`.
    ///
    /// Other units' anchors block the route; the requester's own does not.
    pub fn request(
        &mut self,
        unit: UnitId,
        generation: u64,
        anchor: TileCoord,
        origin: TileCoord,
        destination: TileCoord,
    ) -> RequestId {
        let request = RequestId(self.next_request);
        self.next_request += 1;
        self.in_flight += 1;

        tracing::debug!(%unit, %origin, %destination, request = request.0, "path requested");

        let sender = self.sender.clone();
        self.search.find_path(
            PathQuery::new(origin, destination).with_own(anchor),
            Box::new(move |tiles| {
                let outcome = PathOutcome {
                    request,
                    unit,
                    generation,
                    origin,
                    destination,
                    path: tiles.and_then(|t| TilePath::from_search(origin, t)),
                };
                // The receiver lives as long as the planner that owns the search.
                let _ = sender.send(outcome);
            }),
        );
        request
    }

    /// Hand the search a fresh snapshot and resolve queued requests.
    pub fn calculate(&mut self, grid: &OccupancyGrid) {
        self.search.set_grid(grid);
        self.search.calculate();
    }

    /// Take every outcome delivered so far, in delivery order.
    pub fn drain(&mut self) -> Vec<PathOutcome> {
        let outcomes: Vec<PathOutcome> = self.inbox.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(outcomes.len());
        outcomes
    }

    /// Requests issued but not yet drained.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Resolve one request immediately against `grid`.
    ///
    /// Used for validation (level lanes, previews). Requests queued
    /// earlier are resolved as well and stay in the inbox.
    pub fn find_now(&mut self, grid: &OccupancyGrid, origin: TileCoord, destination: TileCoord) -> Option<TilePath> {
        let (tx, rx) = mpsc::channel();
        self.search.find_path(
            PathQuery::new(origin, destination),
            Box::new(move |tiles| {
                let _ = tx.send(tiles);
            }),
        );
        self.calculate(grid);
        rx.try_recv().ok().flatten().and_then(|t| TilePath::from_search(origin, t))
    }
}

/// Tile codes found along a path, for assertions and debugging.
#[must_use]
pub fn codes_along(grid: &OccupancyGrid, path: &TilePath) -> Vec<Option<TileCode>> {
    path.iter().map(|&t| grid.code(t)).collect()
}
