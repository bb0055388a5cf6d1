const COMPUTE: &[&str] = &[
    "Consider rightsizing EC2 instances",
    "Use Spot Instances for non-critical workloads",
    "Enable EC2 Instance Savings Plans",
];

const DATABASE: &[&str] = &[
    "Review RDS instance sizes and types",
    "Consider Aurora Serverless for variable workloads",
    "Review automated backup retention",
];

const CACHE: &[&str] = &[
    "Review cache instance sizes",
    "Pick Redis or Memcached based on the access pattern",
    "Monitor cache hit ratios",
];

const GENERIC: &[&str] = &[
    "Review usage patterns for cost optimization",
    "Check the provider's cost optimization recommendations",
];

const ALWAYS: &[&str] = &[
    "Use Cost Explorer for detailed analysis",
    "Set up billing alerts for proactive monitoring",
];

pub fn suggestions_for(service: &str) -> Vec<&'static str> {
    let specific = if service.contains("Elastic Compute Cloud") || service.contains("EC2") {
        COMPUTE
    } else if service.contains("Relational Database Service") || service.contains("RDS") {
        DATABASE
    } else if service.contains("ElastiCache") {
        CACHE
    } else {
        GENERIC
    };

    specific.iter().chain(ALWAYS.iter()).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_services_get_compute_tips() {
        let tips = suggestions_for("Amazon Elastic Compute Cloud - Compute");
        assert_eq!(tips[0], "Consider rightsizing EC2 instances");
        assert_eq!(tips.len(), COMPUTE.len() + ALWAYS.len());
    }

    #[test]
    fn unknown_services_get_generic_tips() {
        let tips = suggestions_for("Amazon Route 53");
        assert_eq!(tips[0], GENERIC[0]);
        assert!(tips.contains(&"Set up billing alerts for proactive monitoring"));
    }
}
