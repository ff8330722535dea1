//! Human-memorable link slugs (`quiet-otter-42`).

use rand::Rng;

const ADJECTIVES: &[&str] = &[
  "amber", "bold", "brisk", "calm", "clever", "crisp", "dapper", "deep",
  "dusty", "eager", "fancy", "fleet", "gentle", "glad", "grand", "happy",
  "humble", "ideal", "jolly", "keen", "lively", "lucky", "mellow", "merry",
  "misty", "noble", "plain", "proud", "quiet", "rapid", "rosy", "rustic",
  "sharp", "silent", "sleek", "snug", "solid", "spry", "stout", "sunny",
  "swift", "tidy", "vivid", "warm", "wise", "witty", "young", "zesty",
];

const NOUNS: &[&str] = &[
  "acorn", "badger", "beacon", "birch", "brook", "cedar", "cliff", "comet",
  "crane", "delta", "ember", "falcon", "fern", "finch", "fjord", "gale",
  "glade", "grove", "harbor", "hawk", "heron", "lagoon", "lark", "linden",
  "lynx", "maple", "meadow", "mole", "moose", "otter", "owl", "pebble",
  "pine", "raven", "reef", "ridge", "river", "sparrow", "spruce", "stone",
  "summit", "swan", "thicket", "trail", "valley", "willow", "wren", "yarrow",
];

/// One random candidate slug. Global uniqueness is the caller's problem —
/// the engine checks against `meta.link` and retries.
pub fn random_slug() -> String {
  let mut rng = rand::thread_rng();
  let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
  let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
  format!("{adjective}-{noun}-{}", rng.gen_range(10..100))
}

/// A fallback suffix for the rare case every retry collided.
pub fn random_suffix() -> String {
  let mut rng = rand::thread_rng();
  format!("{:06x}", rng.gen_range(0..0xff_ffffu32))
}
