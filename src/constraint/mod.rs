//! Constraints
//!
//! User constraints joining two bodies, built from the parts in
//! [`part`](part/index.html). Each constraint type lives in its own pool;
//! handles pack the pool index, the type and a sequence nibble guarding
//! against reuse.

pub mod part;

pub mod cone;
pub mod contact;
pub mod distance;
pub mod fixed;
pub mod hinge;
pub mod point;
pub mod six_dof;
pub mod slider;
pub mod swing_twist;

use body::{BodyId, RigidBody};

pub use self::cone::{ConeConstraint, ConeSettings};
pub use self::distance::{DistanceConstraint, DistanceSettings};
pub use self::fixed::{FixedConstraint, FixedSettings};
pub use self::hinge::{HingeConstraint, HingeSettings};
pub use self::point::{PointConstraint, PointSettings};
pub use self::six_dof::{AxisMode, SixDofConstraint, SixDofSettings};
pub use self::slider::{SliderConstraint, SliderSettings};
pub use self::swing_twist::{SwingTwistConstraint, SwingTwistSettings};

/// Motor state shared by the motorized constraints.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MotorMode {
    /// Motor disabled; friction may still apply.
    Off,
    /// Drive toward a target velocity.
    Velocity,
    /// Spring toward a target position.
    Position,
}

/// Constraint type tag, stored in the handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintType {
    /// [`HingeConstraint`](hinge/struct.HingeConstraint.html)
    Hinge = 0,
    /// [`SliderConstraint`](slider/struct.SliderConstraint.html)
    Slider = 1,
    /// [`DistanceConstraint`](distance/struct.DistanceConstraint.html)
    Distance = 2,
    /// [`PointConstraint`](point/struct.PointConstraint.html)
    Point = 3,
    /// [`FixedConstraint`](fixed/struct.FixedConstraint.html)
    Fixed = 4,
    /// [`SwingTwistConstraint`](swing_twist/struct.SwingTwistConstraint.html)
    SwingTwist = 5,
    /// [`ConeConstraint`](cone/struct.ConeConstraint.html)
    Cone = 6,
    /// [`SixDofConstraint`](six_dof/struct.SixDofConstraint.html)
    SixDof = 7,
    /// Contact constraints, rebuilt every step from manifolds.
    Contact = 8,
}

impl ConstraintType {
    fn from_bits(bits: u32) -> ConstraintType {
        match bits {
            0 => ConstraintType::Hinge,
            1 => ConstraintType::Slider,
            2 => ConstraintType::Distance,
            3 => ConstraintType::Point,
            4 => ConstraintType::Fixed,
            5 => ConstraintType::SwingTwist,
            6 => ConstraintType::Cone,
            7 => ConstraintType::SixDof,
            _ => ConstraintType::Contact,
        }
    }
}

/// Opaque constraint handle: 23 bits of pool index, 5 bits of type, 4 bits
/// of sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(u32);

impl ConstraintId {
    /// Handle that never refers to a constraint.
    pub const INVALID: ConstraintId = ConstraintId(!0);

    /// Pack index, type and sequence into a handle.
    pub fn new(index: u32, constraint_type: ConstraintType, sequence: u32) -> Self {
        debug_assert!(index < (1 << 23) && sequence < (1 << 4));
        ConstraintId(index | ((constraint_type as u32) << 23) | (sequence << 28))
    }

    /// Pool index part.
    pub fn index(self) -> u32 {
        self.0 & 0x007f_ffff
    }

    /// Type part.
    pub fn constraint_type(self) -> ConstraintType {
        ConstraintType::from_bits((self.0 >> 23) & 0x1f)
    }

    /// Sequence part.
    pub fn sequence(self) -> u32 {
        self.0 >> 28
    }

    /// Raw packed value, usable as a stable sort key.
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Fields common to every constraint.
#[derive(Clone, Debug)]
pub struct ConstraintBase {
    /// First constrained body.
    pub body_a: BodyId,
    /// Second constrained body.
    pub body_b: BodyId,
    /// Disabled constraints are skipped by the solver and island builder.
    pub enabled: bool,
    /// Higher priority constraints are solved first within an island.
    pub priority: u32,
    /// Velocity iteration override; 0 uses the world setting.
    pub velocity_iterations_override: u32,
    /// Position iteration override; 0 uses the world setting.
    pub position_iterations_override: u32,
}

impl ConstraintBase {
    /// Base joining two bodies, enabled, priority 0, no overrides.
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        ConstraintBase {
            body_a,
            body_b,
            enabled: true,
            priority: 0,
            velocity_iterations_override: 0,
            position_iterations_override: 0,
        }
    }
}

/// Setup/solve lifecycle every user constraint implements.
///
/// The solver calls the methods in order per island: `setup_velocity`, then
/// `warm_start_velocity` when warm starting is on, then `solve_velocity`
/// once per velocity iteration, and `solve_position` once per position
/// iteration after integration.
pub trait Constraint {
    /// Common fields.
    fn base(&self) -> &ConstraintBase;
    /// Common fields, mutable.
    fn base_mut(&mut self) -> &mut ConstraintBase;
    /// Compute transforms and effective masses, activate the needed parts.
    fn setup_velocity(&mut self, body_a: &RigidBody, body_b: &RigidBody, dt: f32);
    /// Apply scaled cached impulses from the previous step.
    fn warm_start_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32);
    /// One velocity iteration. Returns whether any impulse was applied.
    fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, dt: f32) -> bool;
    /// One position iteration. Returns whether any correction was applied.
    fn solve_position(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        dt: f32,
        baumgarte: f32,
    ) -> bool;
}

struct Slot<T> {
    sequence: u32,
    value: Option<T>,
}

/// Free-list pool for one constraint type.
struct ConstraintPool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for ConstraintPool<T> {
    fn default() -> Self {
        ConstraintPool {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> ConstraintPool<T> {
    fn add(&mut self, value: T, constraint_type: ConstraintType) -> ConstraintId {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.sequence = (slot.sequence + 1) & 0xf;
                slot.value = Some(value);
                ConstraintId::new(index, constraint_type, slot.sequence)
            }
            None => {
                self.slots.push(Slot {
                    sequence: 0,
                    value: Some(value),
                });
                ConstraintId::new(self.slots.len() as u32 - 1, constraint_type, 0)
            }
        }
    }

    fn remove(&mut self, id: ConstraintId) -> Option<T> {
        let index = id.index() as usize;
        if index >= self.slots.len() || self.slots[index].sequence != id.sequence() {
            return None;
        }
        let value = self.slots[index].value.take();
        if value.is_some() {
            self.free.push(id.index());
        }
        value
    }

    fn get(&self, id: ConstraintId) -> Option<&T> {
        self.slots.get(id.index() as usize).and_then(|slot| {
            if slot.sequence == id.sequence() {
                slot.value.as_ref()
            } else {
                None
            }
        })
    }

    fn get_mut(&mut self, id: ConstraintId) -> Option<&mut T> {
        self.slots.get_mut(id.index() as usize).and_then(|slot| {
            if slot.sequence == id.sequence() {
                slot.value.as_mut()
            } else {
                None
            }
        })
    }

    fn each_id<F>(&self, constraint_type: ConstraintType, f: &mut F)
    where
        F: FnMut(ConstraintId),
    {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.value.is_some() {
                f(ConstraintId::new(index as u32, constraint_type, slot.sequence));
            }
        }
    }
}

/// All user constraints of a world, pooled per type.
#[derive(Default)]
pub struct ConstraintSet {
    hinges: ConstraintPool<HingeConstraint>,
    sliders: ConstraintPool<SliderConstraint>,
    distances: ConstraintPool<DistanceConstraint>,
    points: ConstraintPool<PointConstraint>,
    fixeds: ConstraintPool<FixedConstraint>,
    swing_twists: ConstraintPool<SwingTwistConstraint>,
    cones: ConstraintPool<ConeConstraint>,
    six_dofs: ConstraintPool<SixDofConstraint>,
}

impl ConstraintSet {
    /// Empty set.
    pub fn new() -> Self {
        ConstraintSet::default()
    }

    /// Add a hinge.
    pub fn add_hinge(&mut self, constraint: HingeConstraint) -> ConstraintId {
        self.hinges.add(constraint, ConstraintType::Hinge)
    }

    /// Add a slider.
    pub fn add_slider(&mut self, constraint: SliderConstraint) -> ConstraintId {
        self.sliders.add(constraint, ConstraintType::Slider)
    }

    /// Add a distance constraint.
    pub fn add_distance(&mut self, constraint: DistanceConstraint) -> ConstraintId {
        self.distances.add(constraint, ConstraintType::Distance)
    }

    /// Add a point constraint.
    pub fn add_point(&mut self, constraint: PointConstraint) -> ConstraintId {
        self.points.add(constraint, ConstraintType::Point)
    }

    /// Add a fixed constraint.
    pub fn add_fixed(&mut self, constraint: FixedConstraint) -> ConstraintId {
        self.fixeds.add(constraint, ConstraintType::Fixed)
    }

    /// Add a swing twist constraint.
    pub fn add_swing_twist(&mut self, constraint: SwingTwistConstraint) -> ConstraintId {
        self.swing_twists.add(constraint, ConstraintType::SwingTwist)
    }

    /// Add a cone constraint.
    pub fn add_cone(&mut self, constraint: ConeConstraint) -> ConstraintId {
        self.cones.add(constraint, ConstraintType::Cone)
    }

    /// Add a six degree of freedom constraint.
    pub fn add_six_dof(&mut self, constraint: SixDofConstraint) -> ConstraintId {
        self.six_dofs.add(constraint, ConstraintType::SixDof)
    }

    /// Remove a constraint; stale handles are ignored.
    ///
    /// Returns whether a constraint was removed.
    pub fn remove(&mut self, id: ConstraintId) -> bool {
        match id.constraint_type() {
            ConstraintType::Hinge => self.hinges.remove(id).is_some(),
            ConstraintType::Slider => self.sliders.remove(id).is_some(),
            ConstraintType::Distance => self.distances.remove(id).is_some(),
            ConstraintType::Point => self.points.remove(id).is_some(),
            ConstraintType::Fixed => self.fixeds.remove(id).is_some(),
            ConstraintType::SwingTwist => self.swing_twists.remove(id).is_some(),
            ConstraintType::Cone => self.cones.remove(id).is_some(),
            ConstraintType::SixDof => self.six_dofs.remove(id).is_some(),
            ConstraintType::Contact => false,
        }
    }

    /// Borrow a constraint through the lifecycle trait.
    pub fn get(&self, id: ConstraintId) -> Option<&dyn Constraint> {
        match id.constraint_type() {
            ConstraintType::Hinge => self.hinges.get(id).map(|c| -> &dyn Constraint { c }),
            ConstraintType::Slider => self.sliders.get(id).map(|c| -> &dyn Constraint { c }),
            ConstraintType::Distance => self.distances.get(id).map(|c| -> &dyn Constraint { c }),
            ConstraintType::Point => self.points.get(id).map(|c| -> &dyn Constraint { c }),
            ConstraintType::Fixed => self.fixeds.get(id).map(|c| -> &dyn Constraint { c }),
            ConstraintType::SwingTwist => {
                self.swing_twists.get(id).map(|c| -> &dyn Constraint { c })
            }
            ConstraintType::Cone => self.cones.get(id).map(|c| -> &dyn Constraint { c }),
            ConstraintType::SixDof => self.six_dofs.get(id).map(|c| -> &dyn Constraint { c }),
            ConstraintType::Contact => None,
        }
    }

    /// Mutably borrow a constraint through the lifecycle trait.
    pub fn get_mut(&mut self, id: ConstraintId) -> Option<&mut dyn Constraint> {
        match id.constraint_type() {
            ConstraintType::Hinge => {
                self.hinges.get_mut(id).map(|c| -> &mut dyn Constraint { c })
            }
            ConstraintType::Slider => {
                self.sliders.get_mut(id).map(|c| -> &mut dyn Constraint { c })
            }
            ConstraintType::Distance => self
                .distances
                .get_mut(id)
                .map(|c| -> &mut dyn Constraint { c }),
            ConstraintType::Point => {
                self.points.get_mut(id).map(|c| -> &mut dyn Constraint { c })
            }
            ConstraintType::Fixed => {
                self.fixeds.get_mut(id).map(|c| -> &mut dyn Constraint { c })
            }
            ConstraintType::SwingTwist => self
                .swing_twists
                .get_mut(id)
                .map(|c| -> &mut dyn Constraint { c }),
            ConstraintType::Cone => {
                self.cones.get_mut(id).map(|c| -> &mut dyn Constraint { c })
            }
            ConstraintType::SixDof => self
                .six_dofs
                .get_mut(id)
                .map(|c| -> &mut dyn Constraint { c }),
            ConstraintType::Contact => None,
        }
    }

    /// Borrow a hinge by handle, for reading motor and limit state.
    pub fn hinge(&self, id: ConstraintId) -> Option<&HingeConstraint> {
        self.hinges.get(id)
    }

    /// Mutably borrow a hinge by handle.
    pub fn hinge_mut(&mut self, id: ConstraintId) -> Option<&mut HingeConstraint> {
        self.hinges.get_mut(id)
    }

    /// Borrow a slider by handle.
    pub fn slider(&self, id: ConstraintId) -> Option<&SliderConstraint> {
        self.sliders.get(id)
    }

    /// Mutably borrow a slider by handle.
    pub fn slider_mut(&mut self, id: ConstraintId) -> Option<&mut SliderConstraint> {
        self.sliders.get_mut(id)
    }

    /// Mutably borrow a six degree of freedom constraint by handle.
    pub fn six_dof_mut(&mut self, id: ConstraintId) -> Option<&mut SixDofConstraint> {
        self.six_dofs.get_mut(id)
    }

    /// Call `f` with the id of every live constraint, in type then index
    /// order.
    pub fn each_id<F>(&self, f: &mut F)
    where
        F: FnMut(ConstraintId),
    {
        self.hinges.each_id(ConstraintType::Hinge, f);
        self.sliders.each_id(ConstraintType::Slider, f);
        self.distances.each_id(ConstraintType::Distance, f);
        self.points.each_id(ConstraintType::Point, f);
        self.fixeds.each_id(ConstraintType::Fixed, f);
        self.swing_twists.each_id(ConstraintType::SwingTwist, f);
        self.cones.each_id(ConstraintType::Cone, f);
        self.six_dofs.each_id(ConstraintType::SixDof, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trips_exactly() {
        let types = [
            ConstraintType::Hinge,
            ConstraintType::Slider,
            ConstraintType::Distance,
            ConstraintType::Point,
            ConstraintType::Fixed,
            ConstraintType::SwingTwist,
            ConstraintType::Cone,
            ConstraintType::SixDof,
            ConstraintType::Contact,
        ];
        for &index in &[0u32, 5, (1 << 23) - 1] {
            for &constraint_type in &types {
                for sequence in 0..16 {
                    let id = ConstraintId::new(index, constraint_type, sequence);
                    assert_eq!(id.index(), index);
                    assert_eq!(id.constraint_type(), constraint_type);
                    assert_eq!(id.sequence(), sequence);
                }
            }
        }
    }
}
