// Angle unit conversion
//
// The wire carries radians as f32; callers work in degrees. The conversion is
// done in f64 so a round trip only rounds once in each direction.

/// Degrees (or deg/s) to radians (or rad/s)
pub fn deg_to_rad(degrees: f32) -> f32 {
    f64::from(degrees).to_radians() as f32
}

/// Radians (or rad/s) to degrees (or deg/s)
pub fn rad_to_deg(radians: f32) -> f32 {
    f64::from(radians).to_degrees() as f32
}
