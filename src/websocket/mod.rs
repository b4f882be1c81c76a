//! Viewer WebSocket Streaming
//!
//! Dashboards connect over WebSocket and receive JSON frames:
//!
//! ```json
//! {"topic": "sensor/temp", "payload": 23.5, "timestamp": 1714552200000}
//! ```
//!
//! - `welcome` on connect, always the first frame
//! - `status` / `status-error` after every broker health poll
//! - `mqtt-disconnect` when the broker link drops
//! - one frame per decrypted reading, topic = the broker topic
//!
//! Viewers never need to send anything; inbound text is only logged.
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:3001/ws');
//! ws.onmessage = (event) => {
//!   const frame = JSON.parse(event.data);
//!   console.log(frame.topic, frame.payload);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{HubConfig, HubError, ViewerHub, ViewerId};
pub use messages::{topics, ViewerEvent, WELCOME_MESSAGE};
