//! Builder-related types.

use crate::*;
use std::sync::Arc;

/// The general pinhold agent builder.
/// This contains both configuration and factory instances,
/// allowing construction of runtime module instances.
#[derive(Debug)]
pub struct Builder {
    /// The module configuration to be used when building modules.
    /// This can be loaded from disk or modified before freezing the
    /// builder.
    pub config: crate::config::Config,

    /// The [signer::Signer] to use for this agent instance.
    pub signer: signer::DynSigner,

    /// The [node::NodeClientFactory] to be used for creating
    /// [node::NodeClient] instances.
    pub node: node::DynNodeClientFactory,

    /// The [pinner::PinnerFactory] to be used for creating
    /// [pinner::Pinner] instances.
    pub pinner: pinner::DynPinnerFactory,

    /// The [report::ReportFactory] to be used for creating
    /// [report::Report] instances.
    pub report: report::DynReportFactory,
}

impl Builder {
    /// Construct a default config given the configured module factories.
    /// Note, this should be called before freezing the Builder instance
    /// in an Arc<>.
    pub fn set_default_config(&mut self) -> PinResult<()> {
        let Self {
            config,
            signer: _,
            node,
            pinner,
            report,
        } = self;

        node.default_config(config)?;
        pinner.default_config(config)?;
        report.default_config(config)?;

        Ok(())
    }

    /// Freeze the builder so module factories can be invoked with it.
    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }
}
