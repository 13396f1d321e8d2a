use nalgebra::Point3;

/// A spatial weighting kernel evaluated against a center and radius.
///
/// The kernel output multiplies the iteration's base error threshold:
/// values near zero lock detail in place, values near one leave the
/// threshold untouched. The loop's fast path checks the tag, so "is this
/// the constant kernel?" is plain enum equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Kernel {
    /// No attenuation anywhere: a uniform threshold.
    #[default]
    Constant,
    Gaussian,
    Triangular,
    Square,
}

impl Kernel {
    /// Look up a kernel by the name used on the command line and in
    /// region-spec files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gaussian" => Some(Kernel::Gaussian),
            "triangular" => Some(Kernel::Triangular),
            "square" => Some(Kernel::Square),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Constant => "constant",
            Kernel::Gaussian => "gaussian",
            Kernel::Triangular => "triangular",
            Kernel::Square => "square",
        }
    }

    /// Evaluate the kernel at `p` for a ball at `center` with `radius`.
    ///
    /// `scale` narrows or flattens each kernel in its own way; `negate`
    /// swaps which side of the falloff is preserved.
    pub fn evaluate(
        &self,
        p: &Point3<f64>,
        center: &Point3<f64>,
        radius: f64,
        scale: f64,
        negate: bool,
    ) -> f64 {
        match self {
            Kernel::Constant => 0.0,
            Kernel::Gaussian => {
                // ln(scale) is undefined at or below one; substitute the
                // default rather than producing NaN
                let scale = if scale <= 1.0 { 2.0 } else { scale };
                let g = (-(p - center).norm_squared()
                    / (2.0 * (radius * radius / (2.0 * scale.ln()))))
                .exp();
                if negate {
                    g
                } else {
                    1.0 - g
                }
            }
            Kernel::Triangular => {
                let scale = if scale == 0.0 { 1.0 } else { scale };
                let d = (p - center).norm();
                let scaled_radius = radius / scale;
                if d.abs() < scaled_radius.abs() {
                    let ramp = (d / scaled_radius).abs();
                    if negate {
                        1.0 - ramp
                    } else {
                        ramp
                    }
                } else if negate {
                    0.0
                } else {
                    1.0
                }
            }
            Kernel::Square => {
                let d = (p - center).norm();
                if d.abs() <= radius {
                    // clamp |scale| to one so the plateau stays in [0, 1]
                    let scale = if scale.abs() > 1.0 {
                        scale / scale.abs()
                    } else {
                        scale
                    };
                    if negate {
                        scale
                    } else {
                        1.0 - scale
                    }
                } else if negate {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }
}
