//! Small formatting helpers.

use std::fmt::Write;

/// Render a datagram as offset, hex and ASCII columns, 16 bytes per line
pub fn hexdump(buf: &[u8]) -> String {
    let mut out = String::with_capacity(buf.len() * 4 + 8);
    for (line, chunk) in buf.chunks(16).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:04x} ", line * 16);
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, " {:02x}", b);
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  ");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
    }
    out
}
