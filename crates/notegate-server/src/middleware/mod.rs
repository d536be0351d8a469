// HTTP middleware implementations

pub mod admission; // Admission pipeline: identity, rate limit, quota
