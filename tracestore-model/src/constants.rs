// Copyright (C) 2023 Quickwit, Inc.
//
// Quickwit is offered under the AGPL v3.0 and as commercial software.
// For commercial licensing, contact us at hello@quickwit.io.
//
// AGPL:
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Well-known annotation values and binary annotation keys.
//!
//! Instrumentation libraries record the four core annotations below to mark
//! the client and server sides of an RPC. The address keys (`ca`/`sa`)
//! identify the caller and callee when only one side of the call is
//! instrumented.

/// The client has made the request. This sets the beginning of the span.
pub const CLIENT_SEND: &str = "cs";

/// The client has received the response from the server.
pub const CLIENT_RECV: &str = "cr";

/// The server has received the request and will start processing it.
pub const SERVER_RECV: &str = "sr";

/// The server has sent the response back to the client.
pub const SERVER_SEND: &str = "ss";

/// Binary annotation key marking the endpoint of the caller.
pub const CLIENT_ADDR: &str = "ca";

/// Binary annotation key marking the endpoint of the callee.
pub const SERVER_ADDR: &str = "sa";

/// Annotation value or binary annotation key flagging a failed operation.
pub const ERROR: &str = "error";
