/// Data layer: core types, loading, and filtering.
///
/// Architecture:
/// ```text
///  .fcs / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Sample (metadata + EventTable)
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │  EventTable   │  named f64 columns, row-aligned
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  positive / finite predicates → row subset
///   └──────────┘
/// ```

pub mod fcs;
pub mod filter;
pub mod loader;
pub mod model;
