//! Serialized message link between the page context and the bridge.
//!
//! Frames are JSON text, the only thing allowed to cross the boundary.

use tokio::sync::mpsc;

/// Page-side ends of the link.
pub struct PageLink {
    pub to_bridge: mpsc::UnboundedSender<String>,
    pub from_bridge: mpsc::UnboundedReceiver<String>,
}

/// Bridge-side ends of the link.
pub struct BridgeEndpoint {
    pub from_page: mpsc::UnboundedReceiver<String>,
    pub to_page: mpsc::UnboundedSender<String>,
}

pub fn page_link() -> (PageLink, BridgeEndpoint) {
    let (to_bridge, from_page) = mpsc::unbounded_channel();
    let (to_page, from_bridge) = mpsc::unbounded_channel();
    (
        PageLink {
            to_bridge,
            from_bridge,
        },
        BridgeEndpoint { from_page, to_page },
    )
}
