//! Soft constraint settings

/// How the spring stiffness is specified.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpringMode {
    /// Frequency in Hz plus a damping ratio.
    FrequencyAndDamping,
    /// Direct stiffness (N/m) plus damping (N s/m).
    StiffnessAndDamping,
}

/// Spring parameters that soften a constraint part.
///
/// A part with non zero stiffness corrects error through its velocity
/// constraint only; the position solver skips it.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpringSettings {
    /// Interpretation of `frequency_or_stiffness`.
    pub mode: SpringMode,
    /// Frequency in Hz or stiffness, depending on `mode`.
    pub frequency_or_stiffness: f32,
    /// Damping ratio (frequency mode) or damping coefficient.
    pub damping: f32,
}

impl SpringSettings {
    /// A spring given as oscillation frequency and damping ratio.
    pub fn frequency(frequency: f32, damping: f32) -> Self {
        SpringSettings {
            mode: SpringMode::FrequencyAndDamping,
            frequency_or_stiffness: frequency,
            damping,
        }
    }

    /// A spring given as stiffness and damping coefficient.
    pub fn stiffness(stiffness: f32, damping: f32) -> Self {
        SpringSettings {
            mode: SpringMode::StiffnessAndDamping,
            frequency_or_stiffness: stiffness,
            damping,
        }
    }

    /// Does this spring actually engage?
    pub fn has_stiffness(&self) -> bool {
        self.frequency_or_stiffness > 0.
    }

    /// Soft constraint parameters for a 1-DOF part.
    ///
    /// `inverse_effective_mass` is `J M^-1 J^T` of the part; `error` is the
    /// current position error along the part's axis. Returns
    /// `(gamma, bias, softened effective mass)`.
    pub(crate) fn soft_parameters(
        &self,
        inverse_effective_mass: f32,
        dt: f32,
        error: f32,
    ) -> (f32, f32, f32) {
        let (stiffness, damping) = match self.mode {
            SpringMode::FrequencyAndDamping => {
                let mass = 1. / inverse_effective_mass;
                let omega = 2. * ::std::f32::consts::PI * self.frequency_or_stiffness;
                (mass * omega * omega, 2. * mass * omega * self.damping)
            }
            SpringMode::StiffnessAndDamping => (self.frequency_or_stiffness, self.damping),
        };
        let denominator = dt * (damping + dt * stiffness);
        if denominator < 1.0e-12 {
            return (0., 0., 1. / inverse_effective_mass);
        }
        let gamma = 1. / denominator;
        let bias = error * dt * stiffness * gamma;
        let effective_mass = 1. / (inverse_effective_mass + gamma);
        (gamma, bias, effective_mass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stiffness_spring_is_inert() {
        assert!(!SpringSettings::frequency(0., 1.).has_stiffness());
        assert!(SpringSettings::frequency(2., 0.5).has_stiffness());
    }

    #[test]
    fn stiffer_springs_correct_more_per_step() {
        let soft = SpringSettings::frequency(1., 1.);
        let stiff = SpringSettings::frequency(20., 1.);
        let (_, soft_bias, _) = soft.soft_parameters(1., 1. / 60., 0.1);
        let (_, stiff_bias, _) = stiff.soft_parameters(1., 1. / 60., 0.1);
        assert!(stiff_bias > soft_bias);
        assert!(soft_bias > 0.);
    }
}
