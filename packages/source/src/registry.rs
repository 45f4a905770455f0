//! Adapter registry: maps a [`Provider`] tag to its adapter.
//!
//! Adapters are stateless unit structs, so the registry hands out
//! `'static` references instead of allocating per call.

use skyfeed_observation_models::Provider;

use crate::SourceAdapter;
use crate::sources::ambient::AmbientAdapter;
use crate::sources::html::HtmlTableAdapter;
use crate::sources::metar::MetarAdapter;
use crate::sources::nws::NwsAdapter;
use crate::sources::synoptic::SynopticAdapter;
use crate::sources::tempest::TempestAdapter;
use crate::sources::weatherlink::WeatherLinkAdapter;

// ── Station cloud APIs ───────────────────────────────────────────────
static TEMPEST: TempestAdapter = TempestAdapter::new();
static AMBIENT: AmbientAdapter = AmbientAdapter::new();
static WEATHERLINK: WeatherLinkAdapter = WeatherLinkAdapter::new();
static SYNOPTIC: SynopticAdapter = SynopticAdapter::new();
// ── Government feeds ─────────────────────────────────────────────────
static METAR: MetarAdapter = MetarAdapter::new();
static NWS: NwsAdapter = NwsAdapter::new();
// ── Scraped pages ────────────────────────────────────────────────────
static HTML: HtmlTableAdapter = HtmlTableAdapter::new();

/// Returns the adapter that understands `provider`'s payloads.
#[must_use]
pub fn adapter_for(provider: Provider) -> &'static dyn SourceAdapter {
    match provider {
        Provider::Tempest => &TEMPEST,
        Provider::Ambient => &AMBIENT,
        Provider::Weatherlink => &WEATHERLINK,
        Provider::Synoptic => &SYNOPTIC,
        Provider::Metar => &METAR,
        Provider::Nws => &NWS,
        Provider::Html => &HTML,
    }
}

/// Every registered adapter, in [`Provider`] declaration order.
#[must_use]
pub fn all_adapters() -> Vec<&'static dyn SourceAdapter> {
    use strum::IntoEnumIterator;
    Provider::iter().map(adapter_for).collect()
}
