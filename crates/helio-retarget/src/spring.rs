//! Damped vector spring
//!
//! Solves `x'' = -k (x - target) - 2ζ√k x'` in closed form over each step (unit mass), so the
//! result is stable for any time step. With ζ >= 1 and a fixed target the position never
//! overshoots.

use glam::Vec3;

/// Velocity carried between frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpringState {
    pub velocity: Vec3,
}

impl SpringState {
    pub fn reset(&mut self) {
        self.velocity = Vec3::ZERO;
    }
}

/// Advance `current` toward `target` by `delta_time`, updating `state`.
pub fn vector_spring_interp(
    current: Vec3,
    target: Vec3,
    state: &mut SpringState,
    stiffness: f32,
    damping_ratio: f32,
    delta_time: f32,
) -> Vec3 {
    if delta_time <= f32::EPSILON || stiffness <= 0.0 {
        return current;
    }

    let omega = stiffness.sqrt();
    let zeta = damping_ratio.max(0.0);
    let t = delta_time;
    let e0 = current - target;
    let v0 = state.velocity;

    let (error, velocity) = if (zeta - 1.0).abs() < 1.0e-3 {
        let decay = (-omega * t).exp();
        let c = v0 + omega * e0;
        ((e0 + c * t) * decay, (v0 - c * (omega * t)) * decay)
    } else if zeta > 1.0 {
        let s = (zeta * zeta - 1.0).sqrt();
        let r1 = -omega * (zeta - s);
        let r2 = -omega * (zeta + s);
        let c2 = (v0 - e0 * r1) / (r2 - r1);
        let c1 = e0 - c2;
        let (d1, d2) = ((r1 * t).exp(), (r2 * t).exp());
        (c1 * d1 + c2 * d2, c1 * (r1 * d1) + c2 * (r2 * d2))
    } else {
        let omega_d = omega * (1.0 - zeta * zeta).sqrt();
        let decay = (-zeta * omega * t).exp();
        let (sin, cos) = (omega_d * t).sin_cos();
        let error = (e0 * cos + (v0 + e0 * (zeta * omega)) * (sin / omega_d)) * decay;
        let velocity =
            (v0 * cos - (e0 * (omega * omega) + v0 * (zeta * omega)) * (sin / omega_d)) * decay;
        (error, velocity)
    };

    state.velocity = velocity;
    target + error
}
