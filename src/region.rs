use anyhow::{anyhow, Result};
use itertools::Itertools;
use log::debug;
use nalgebra::Point3;

use crate::kernel::Kernel;

/// A spatial ball with a reduction target and a weighting kernel.
///
/// A *bound* region's target ratio is a hard stop condition: the loop may
/// not finish before the region's triangle count has dropped to
/// `target_ratio` of its starting count. An unbound region only
/// contributes its kernel weighting.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub target_ratio: f64,
    pub bound: bool,
    pub kernel: Kernel,
    pub center: Point3<f64>,
    pub radius: f64,
    pub scale: f64,
    pub power: f64,
    pub negate: bool,

    // run bookkeeping, refreshed by the simplification loop
    pub done: bool,
    pub start_count: usize,
    pub end_count: usize,
}

impl Default for Region {
    fn default() -> Self {
        Region {
            target_ratio: 0.5,
            bound: false,
            kernel: Kernel::Constant,
            center: Point3::origin(),
            radius: 1.0,
            scale: 1.0,
            power: 1.0,
            negate: false,
            done: false,
            start_count: 0,
            end_count: 0,
        }
    }
}

/// The separators accepted inside coordinate and ratio-pair arguments,
/// so `10,-2,0.5`, `"( 10, -2, 0.5 )"` and `"[10 -2 0.5]"` all parse.
const COORD_SEPARATORS: &[char] = &['{', '[', '(', ' ', ',', ')', ']', '}'];

fn split_numbers(raw: &str) -> Result<Vec<f64>> {
    raw.split(COORD_SEPARATORS)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| anyhow!("could not parse `{}` as a number in `{}`", s, raw))
        })
        .collect()
}

/// Parse an `x,y,z` coordinate argument.
pub fn parse_coord(raw: &str) -> Result<Point3<f64>> {
    let values = split_numbers(raw)?;
    if values.len() != 3 {
        return Err(anyhow!(
            "expected three coordinates in `{}`, found {}",
            raw,
            values.len()
        ));
    }
    Ok(Point3::new(values[0], values[1], values[2]))
}

/// Parse an `r_in,r_out` ratio pair argument.
pub fn parse_ratio_pair(raw: &str) -> Result<(f64, f64)> {
    let values = split_numbers(raw)?;
    if values.len() != 2 {
        return Err(anyhow!(
            "expected two ratios in `{}`, found {}",
            raw,
            values.len()
        ));
    }
    Ok((values[0], values[1]))
}

/// Parse a region-spec file: one region per line, described by flag/value
/// pairs:
///
/// ```text
/// -q 0.3 -f gaussian -c 10,-2,0.5 -r 20 -s 2 -p 3
/// -Q 0.1 -f square -c (0, 0, 5) -r 4 -n true
/// ```
///
/// `-q` sets an unbound target ratio, `-Q` a bound one. Lines that do not
/// look like flag/value pairs are skipped.
pub fn load_region_spec(text: &str) -> Result<Vec<Region>> {
    let mut regions = Vec::new();

    for (number, line) in text.lines().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 || !tokens[0].starts_with('-') {
            if !tokens.is_empty() {
                debug!("region spec line {} not loaded: {:?}", number + 1, line);
            }
            continue;
        }

        let mut region = Region::default();
        for (flag, value) in tokens.iter().tuples() {
            match *flag {
                "-q" | "-Q" => {
                    let ratio: f64 = value
                        .parse()
                        .map_err(|_| anyhow!("bad ratio `{}` on line {}", value, number + 1))?;
                    if ratio > 0.0 && ratio <= 1.0 {
                        region.target_ratio = ratio;
                    }
                    if *flag == "-Q" {
                        region.bound = true;
                    }
                }
                "-f" => {
                    region.kernel = Kernel::from_name(value).unwrap_or(Kernel::Constant);
                }
                "-c" => region.center = parse_coord(value)?,
                "-r" => {
                    region.radius = value
                        .parse()
                        .map_err(|_| anyhow!("bad radius `{}` on line {}", value, number + 1))?;
                }
                "-s" => {
                    region.scale = value
                        .parse()
                        .map_err(|_| anyhow!("bad scale `{}` on line {}", value, number + 1))?;
                }
                "-p" => {
                    region.power = value
                        .parse()
                        .map_err(|_| anyhow!("bad power `{}` on line {}", value, number + 1))?;
                }
                "-n" => region.negate = *value == "true",
                _ => debug!("unknown region flag {:?} on line {}", flag, number + 1),
            }
        }

        debug!(
            "region: target {} ({}) kernel {} center {:?} radius {} scale {} power {} negate {}",
            region.target_ratio,
            if region.bound { "bound" } else { "unbound" },
            region.kernel.name(),
            region.center,
            region.radius,
            region.scale,
            region.power,
            region.negate,
        );
        regions.push(region);
    }

    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_coord_separators() {
        for raw in ["10,-2,0.5", "(10, -2, 0.5)", "[ 10 -2 0.5 ]", "{10,-2,0.5}"] {
            let p = parse_coord(raw).unwrap();
            assert_relative_eq!(p.x, 10.0);
            assert_relative_eq!(p.y, -2.0);
            assert_relative_eq!(p.z, 0.5);
        }

        assert!(parse_coord("1,2").is_err());
        assert!(parse_coord("1,two,3").is_err());
    }

    #[test]
    fn test_parse_ratio_pair() {
        assert_eq!(parse_ratio_pair("0.2,0.1").unwrap(), (0.2, 0.1));
        assert_eq!(parse_ratio_pair("( 0.1, 0.01 )").unwrap(), (0.1, 0.01));
        assert!(parse_ratio_pair("0.5").is_err());
    }

    #[test]
    fn test_region_spec_lines() {
        let text = "\
-q 0.3 -f gaussian -c 10,-2,0.5 -r 20 -s 2 -p 3
# a comment the parser should step over
-Q 0.1 -f square -c (0,0,5) -r 4 -n true
";
        let regions = load_region_spec(text).unwrap();
        assert_eq!(regions.len(), 2);

        assert!(!regions[0].bound);
        assert_relative_eq!(regions[0].target_ratio, 0.3);
        assert_eq!(regions[0].kernel, Kernel::Gaussian);
        assert_relative_eq!(regions[0].center.x, 10.0);
        assert_relative_eq!(regions[0].radius, 20.0);
        assert_relative_eq!(regions[0].scale, 2.0);
        assert_relative_eq!(regions[0].power, 3.0);
        assert!(!regions[0].negate);

        assert!(regions[1].bound);
        assert_relative_eq!(regions[1].target_ratio, 0.1);
        assert_eq!(regions[1].kernel, Kernel::Square);
        assert!(regions[1].negate);
    }

    #[test]
    fn test_region_spec_defaults_and_validation() {
        // an out-of-range ratio keeps the default of 0.5
        let regions = load_region_spec("-q 1.5 -r 2\n").unwrap();
        assert_eq!(regions.len(), 1);
        assert_relative_eq!(regions[0].target_ratio, 0.5);
        assert_relative_eq!(regions[0].radius, 2.0);
        assert_eq!(regions[0].kernel, Kernel::Constant);
    }
}
