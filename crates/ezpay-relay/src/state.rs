use alloy::network::EthereumWallet;
use alloy::providers::{
    fillers::{
        BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
    },
    Identity, RootProvider,
};
use ezpay::constants::ChainConfig;
use ezpay::{LedgerClient, RelayService, RpcLedger};

/// Concrete provider type from `ProviderBuilder::new().wallet(...).connect_http(...)`.
pub type WalletProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider,
>;

/// The ledger the production server talks to.
pub type ChainLedger = RpcLedger<WalletProvider>;

/// Shared application state for the relay server.
pub struct AppState<L: LedgerClient> {
    pub relay: RelayService<L>,
    /// Display metadata for the chains `relay` serves.
    pub chains: Vec<ChainConfig>,
    /// Bearer token for /metrics.
    pub metrics_token: Option<Vec<u8>>,
    /// Serve /metrics without a token when none is configured.
    pub public_metrics: bool,
}

impl<L: LedgerClient> AppState<L> {
    pub fn new(relay: RelayService<L>, chains: Vec<ChainConfig>) -> Self {
        Self {
            relay,
            chains,
            metrics_token: None,
            public_metrics: false,
        }
    }

    pub fn with_metrics_token(mut self, token: Option<Vec<u8>>) -> Self {
        self.metrics_token = token;
        self
    }

    pub fn with_public_metrics(mut self, public: bool) -> Self {
        self.public_metrics = public;
        self
    }
}
