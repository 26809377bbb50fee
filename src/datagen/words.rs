pub const WORDS: &[&str] = &[
    "alpha", "anchor", "apex", "arc", "atlas", "aurora", "beacon", "birch", "bolt", "breeze",
    "bridge", "canyon", "cedar", "cipher", "cobalt", "comet", "coral", "crest", "delta", "drift",
    "echo", "ember", "falcon", "fern", "fjord", "flint", "forge", "galaxy", "garnet", "glacier",
    "harbor", "hazel", "helix", "horizon", "indigo", "iris", "jade", "juniper", "kernel", "lagoon",
    "lantern", "lattice", "linen", "lotus", "lumen", "maple", "meadow", "meridian", "mesa",
    "mosaic", "nebula", "nimbus", "oasis", "onyx", "orbit", "pebble", "pine", "prism", "quartz",
    "quill", "radiant", "ridge", "river", "saffron", "sage", "signal", "solstice", "sparrow",
    "spruce", "summit", "tango", "tempest", "thistle", "timber", "topaz", "tundra", "umber",
    "valley", "vector", "velvet", "willow", "zenith", "zephyr",
];

pub const SURNAMES: &[&str] = &[
    "Anderson", "Baker", "Carter", "Dalton", "Ellison", "Fischer", "Garcia", "Hughes", "Ingram",
    "Jensen", "Keller", "Lambert", "Morales", "Nakamura", "Olsen", "Patel", "Quinn", "Rivera",
    "Schmidt", "Turner", "Underwood", "Vasquez", "Walsh", "Young", "Zimmerman",
];

pub const COMPANY_SUFFIXES: &[&str] = &["Inc", "LLC", "Group", "Labs", "Systems", "and Sons"];

pub const DOMAINS: &[&str] = &["com", "net", "org", "io"];
