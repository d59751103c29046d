//! The mapper: incremental pose-graph construction.
//!
//! Measurements enter through [`Mapper::add_reading`]; the mapper decides
//! whether to insert a vertex (minimum-distance gate), links it to the
//! previous vertex via odometry and sequential registration, searches the
//! neighbor index for loop-closure candidates, and hands the finished
//! graph to an external solver on [`Mapper::optimize`].
//!
//! The mapper exclusively owns its pose graph. Its API is not reentrant;
//! callers serialize access.

use std::collections::HashMap;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::core::math::is_below_motion;
use crate::core::types::{to_information, Covariance6, Measurement, Transform};
use crate::engine::graph::{NeighborIndex, PoseGraph, VertexId};
use crate::engine::traits::{Odometry, Sensor, Solver};
use crate::error::{Error, Result};

/// Sensor name attributed to odometry edges.
const ODOMETRY_SENSOR: &str = "odometry";

/// Insertion and loop-search thresholds of the mapper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Search radius for loop-closure candidates (meters).
    pub neighbor_radius: f64,

    /// Minimum odometric translation between vertices (meters).
    pub min_translation: f64,

    /// Minimum odometric rotation between vertices (radians).
    pub min_rotation: f64,

    /// Whether to add an edge carrying the raw odometry delta for every
    /// insertion.
    pub add_odometry_edges: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            neighbor_radius: 1.0,
            min_translation: 0.5,
            min_rotation: 0.1,
            add_odometry_edges: false,
        }
    }
}

/// Pose-graph SLAM frontend orchestrator.
pub struct Mapper {
    config: MapperConfig,
    graph: PoseGraph,
    neighbor_index: NeighborIndex,
    sensors: HashMap<String, Box<dyn Sensor>>,
    odometry: Option<Box<dyn Odometry>>,
    solver: Option<Box<dyn Solver>>,

    /// Most recently inserted local vertex. External readings do not
    /// update it.
    last_vertex: Option<VertexId>,

    /// Odometric pose at the time of the last insertion.
    last_odometric_pose: Transform,
}

impl Mapper {
    /// Create a mapper with the given thresholds.
    pub fn new(config: MapperConfig) -> Self {
        Self {
            config,
            graph: PoseGraph::new(),
            neighbor_index: NeighborIndex::new(),
            sensors: HashMap::new(),
            odometry: None,
            solver: None,
            last_vertex: None,
            last_odometric_pose: Transform::identity(),
        }
    }

    /// Register a sensor. Returns `false` when a sensor with the same
    /// name already exists.
    pub fn register_sensor(&mut self, sensor: Box<dyn Sensor>) -> bool {
        let name = sensor.name().to_owned();
        if self.sensors.contains_key(&name) {
            error!("sensor with name '{}' already exists", name);
            return false;
        }
        self.sensors.insert(name, sensor);
        true
    }

    /// Attach an odometry source.
    pub fn set_odometry(&mut self, odometry: Box<dyn Odometry>) {
        self.odometry = Some(odometry);
    }

    /// Attach an optimization backend.
    pub fn set_solver(&mut self, solver: Box<dyn Solver>) {
        self.solver = Some(solver);
    }

    /// The pose graph built so far.
    pub fn graph(&self) -> &PoseGraph {
        &self.graph
    }

    /// Id of the most recently inserted local vertex.
    pub fn last_vertex(&self) -> Option<VertexId> {
        self.last_vertex
    }

    /// Ingest a measurement from one of this robot's sensors.
    ///
    /// Returns `true` when a vertex was inserted, `false` when the reading
    /// was rejected (unregistered sensor, below the minimum-distance gate,
    /// or unmatched without odometry).
    pub fn add_reading(&mut self, m: Measurement) -> bool {
        let sensor_name = m.sensor_name().to_owned();
        if !self.sensors.contains_key(&sensor_name) {
            error!("sensor '{}' has not been registered", sensor_name);
            return false;
        }
        debug!("add reading from own sensor '{}'", sensor_name);

        let odom_now = match &self.odometry {
            Some(odometry) => match odometry.pose_at(m.timestamp_us()) {
                Ok(pose) => Some(pose),
                Err(e) => {
                    warn!("could not get odometry data: {e}");
                    None
                }
            },
            None => None,
        };

        // The first local vertex anchors the map frame at identity.
        if self.last_vertex.is_none() {
            let id = self.graph.add_vertex(m, Transform::identity());
            self.last_vertex = Some(id);
            if let Some(now) = odom_now {
                self.last_odometric_pose = now;
            }
            self.neighbor_index.mark_stale();
            info!("added first reading of sensor '{}'", sensor_name);
            return true;
        }

        let Some(last_id) = self.last_vertex else {
            return false;
        };
        let last_pose = match self.graph.vertex(last_id) {
            Ok(v) => v.corrected_pose,
            Err(e) => {
                error!("internal graph error: {e}");
                return false;
            }
        };

        let odom_delta = match odom_now {
            Some(now) => self.last_odometric_pose.inverse() * now,
            None => Transform::identity(),
        };

        // Minimum-distance gate on odometric motion. The odometric
        // reference stays at the last inserted vertex, so small steps
        // accumulate until the gate opens.
        if odom_now.is_some()
            && is_below_motion(
                &odom_delta,
                self.config.min_translation,
                self.config.min_rotation,
            )
        {
            return false;
        }

        let mut corrected = last_pose * odom_delta;

        // Sequential sensor-level match against the previous measurement.
        let sequential = match (self.sensors.get(&sensor_name), self.graph.vertex(last_id)) {
            (Some(sensor), Ok(last)) => {
                sensor.create_constraint(&last.measurement, &m, &odom_delta, false)
            }
            _ => Err(Error::NoMatch("previous vertex unavailable".into())),
        };
        let seq_constraint = match sequential {
            Ok(constraint) => {
                corrected = last_pose * constraint.transform;
                Some(constraint)
            }
            Err(e) => {
                debug!("sequential match failed: {e}");
                None
            }
        };

        // Without odometry the match itself carries the motion, so the
        // gate applies to it instead; an unmatched reading has no pose.
        if odom_now.is_none() {
            match &seq_constraint {
                Some(c) => {
                    if is_below_motion(
                        &c.transform,
                        self.config.min_translation,
                        self.config.min_rotation,
                    ) {
                        return false;
                    }
                }
                None => {
                    warn!("measurement could not be matched and no odometry is available");
                    return false;
                }
            }
        }

        let new_id = self.graph.add_vertex(m, corrected);

        if odom_now.is_some() && self.config.add_odometry_edges {
            self.add_graph_edge(
                last_id,
                new_id,
                odom_delta,
                Covariance6::identity(),
                ODOMETRY_SENSOR,
                "odom",
            );
        }
        if let Some(c) = seq_constraint {
            self.add_graph_edge(last_id, new_id, c.transform, c.covariance, &sensor_name, "seq");
        }

        // Loop-closure candidates from the neighbor index. Rejected
        // matches are logged and dropped; they never abort the insertion.
        self.neighbor_index.build(&self.graph, &sensor_name);
        let neighbors = self
            .neighbor_index
            .query(&corrected, self.config.neighbor_radius);
        debug!("neighbor search found {} vertices nearby", neighbors.len());

        let mut accepted = Vec::new();
        if let (Some(sensor), Ok(new_vertex)) =
            (self.sensors.get(&sensor_name), self.graph.vertex(new_id))
        {
            for candidate_id in neighbors {
                if candidate_id == new_id || candidate_id == last_id {
                    continue;
                }
                let Ok(candidate) = self.graph.vertex(candidate_id) else {
                    continue;
                };
                let guess = candidate.corrected_pose.inverse() * corrected;
                match sensor.create_constraint(
                    &candidate.measurement,
                    &new_vertex.measurement,
                    &guess,
                    true,
                ) {
                    Ok(c) => accepted.push((candidate_id, c)),
                    Err(e) => debug!("loop candidate {candidate_id} rejected: {e}"),
                }
            }
        }
        for (candidate_id, c) in accepted {
            self.add_graph_edge(
                candidate_id,
                new_id,
                c.transform,
                c.covariance,
                &sensor_name,
                "match",
            );
        }

        self.last_vertex = Some(new_id);
        if let Some(now) = odom_now {
            self.last_odometric_pose = now;
        }
        true
    }

    /// Ingest a measurement from another robot at a known pose.
    ///
    /// Deduplicated by measurement uuid: a known uuid returns the existing
    /// vertex and ignores the supplied pose. Neither the last-vertex
    /// pointer, the odometry state nor the neighbor index are touched.
    pub fn add_external_reading(&mut self, m: Measurement, pose: &Transform) -> VertexId {
        if let Some(existing) = self.graph.vertex_by_uuid(&m.uuid()) {
            debug!("external reading {} already in the graph", m.uuid());
            return existing.id;
        }
        debug!(
            "add external reading from {}:{}",
            m.robot_name(),
            m.sensor_name()
        );
        let id = self.graph.add_vertex(m, *pose);
        self.neighbor_index.mark_stale();
        id
    }

    /// Best estimate of the robot pose at the given time: the last
    /// vertex's corrected pose, extrapolated by odometry when available.
    pub fn current_pose(&self, timestamp_us: u64) -> Transform {
        let base = self
            .last_vertex
            .and_then(|id| self.graph.vertex(id).ok())
            .map(|v| v.corrected_pose);
        let Some(base) = base else {
            return Transform::identity();
        };
        if let Some(odometry) = &self.odometry {
            if let Ok(now) = odometry.pose_at(timestamp_us) {
                return base * (self.last_odometric_pose.inverse() * now);
            }
        }
        base
    }

    /// Stream the graph through the attached solver and apply the
    /// optimized poses.
    ///
    /// Fails with `NoSolver` when no backend is attached. A solver
    /// reporting numerical failure yields `Ok(false)` with every pose
    /// unchanged. On success the neighbor index is stale until the next
    /// rebuild.
    pub fn optimize(&mut self) -> Result<bool> {
        let solver = self.solver.as_mut().ok_or(Error::NoSolver)?;

        for vertex in self.graph.vertices() {
            solver.add_vertex(vertex.id, &vertex.corrected_pose);
        }
        if let Some(first) = self.graph.first_vertex() {
            solver.add_fixed(first.id);
        }
        for edge in self.graph.edges() {
            solver.add_edge(
                edge.source,
                edge.target,
                &edge.transform,
                &to_information(&edge.covariance),
            );
        }

        if !solver.compute() {
            warn!("solver failed to compute a solution");
            return Ok(false);
        }

        for index in 0..self.graph.num_vertices() {
            let id = index as VertexId + 1;
            if let Some(pose) = solver.vertex_pose(id) {
                self.graph.vertex_mut(id)?.corrected_pose = pose;
            }
        }
        self.neighbor_index.mark_stale();
        info!("optimization updated {} vertices", self.graph.num_vertices());
        Ok(true)
    }

    fn add_graph_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        transform: Transform,
        covariance: Covariance6,
        sensor: &str,
        label: &str,
    ) {
        if let Err(e) = self
            .graph
            .add_edge(source, target, transform, covariance, sensor, label)
        {
            error!("failed to add '{label}' edge: {e}");
        }
    }
}
