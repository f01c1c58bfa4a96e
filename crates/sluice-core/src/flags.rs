//! Particle status flag decoding.
//!
//! The simulation packs a particle's boundary state into an `i32`
//! bitmask. Decoding is kept here, away from the pipeline, so the bit
//! layout has exactly one owner.

/// Particle left the simulated domain.
pub const ESCAPED_BIT: i32 = 1 << 0;
/// Particle crossed the inner wall.
pub const INNER_WALL_BIT: i32 = 1 << 1;
/// Particle struck the divertor.
pub const DIVERTOR_BIT: i32 = 1 << 2;
/// Particle position is on the outboard side.
pub const OUTBOARD_BIT: i32 = 1 << 3;
/// Particle position is above the X-point.
pub const ABOVE_XPOINT_BIT: i32 = 1 << 4;

/// Named facts decoded from a raw flag word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParticleFlags {
    /// The particle escaped the domain.
    pub escaped: bool,
    /// Crossed the inner wall.
    pub inner_wall: bool,
    /// Struck the divertor.
    pub divertor: bool,
    /// Outboard side.
    pub outboard: bool,
    /// Above the X-point.
    pub above_xpoint: bool,
}

impl ParticleFlags {
    /// Decode a raw flag word. Unknown bits are ignored.
    pub fn decode(raw: i32) -> Self {
        Self {
            escaped: raw & ESCAPED_BIT != 0,
            inner_wall: raw & INNER_WALL_BIT != 0,
            divertor: raw & DIVERTOR_BIT != 0,
            outboard: raw & OUTBOARD_BIT != 0,
            above_xpoint: raw & ABOVE_XPOINT_BIT != 0,
        }
    }

    /// Re-encode into a flag word.
    pub fn encode(self) -> i32 {
        let mut raw = 0;
        if self.escaped {
            raw |= ESCAPED_BIT;
        }
        if self.inner_wall {
            raw |= INNER_WALL_BIT;
        }
        if self.divertor {
            raw |= DIVERTOR_BIT;
        }
        if self.outboard {
            raw |= OUTBOARD_BIT;
        }
        if self.above_xpoint {
            raw |= ABOVE_XPOINT_BIT;
        }
        raw
    }
}
