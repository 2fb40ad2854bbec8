#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L4LbType {
    Ilb,
    NetLb,
}

const ILB_HEALTH_CHECK_RANGES: &[&str] = &["130.211.0.0/22", "35.191.0.0/16"];
const NETLB_HEALTH_CHECK_RANGES: &[&str] = &["35.191.0.0/16", "209.85.152.0/22", "209.85.204.0/22"];

impl L4LbType {
    pub fn parse(input: &str) -> Option<L4LbType> {
        if input.eq_ignore_ascii_case("ILB") {
            Some(L4LbType::Ilb)
        } else if input.eq_ignore_ascii_case("NetLB") {
            Some(L4LbType::NetLb)
        } else {
            None
        }
    }

    /// Source ranges health check probes originate from
    pub fn health_check_source_ranges(self) -> Vec<String> {
        let ranges = match self {
            Self::Ilb => ILB_HEALTH_CHECK_RANGES,
            Self::NetLb => NETLB_HEALTH_CHECK_RANGES,
        };
        ranges.iter().map(|r| r.to_string()).collect()
    }
}

impl std::fmt::Display for L4LbType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Ilb => write!(f, "ILB"),
            Self::NetLb => write!(f, "NetLB"),
        }
    }
}
