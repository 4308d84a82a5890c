//! zima-widgets: notebook UI widgets as host-independent components
//!
//! - `table`: server-backed data table
//! - `live`: socket-synced live document with structural patching
//! - `textarea`: text box with edit tracking and configurable events
//! - `page`: upgrades the widgets inside a live document and keeps them in sync
//!
//! Browser facilities (HTTP, socket, dialogs, scrolling, event dispatch)
//! are traits injected by the host.

pub mod datatables;
pub mod dom;
pub mod element;
pub mod error;
pub mod event;
pub mod live;
pub mod markup;
pub mod morph;
pub mod page;
pub mod protocol;
pub mod table;
pub mod textarea;

pub use dom::{Dom, NodeId};
pub use element::{CustomElement, ElementHost, HostEvent, Registry};
pub use error::{Result, WidgetError};
pub use event::EventDescriptor;
pub use live::{KeyEvent, LiveDocument};
pub use markup::{parse_fragment, render, Element, Markup};
pub use morph::{morph_children, Patch};
pub use page::{define_widgets, Page};
pub use protocol::{ClientMessage, ServerMessage};
pub use table::{columns_url, RemoteTable, TableConfig};
pub use textarea::TrackedTextarea;
