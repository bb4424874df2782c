//! Decoder for obfuscated audio URLs.
//!
//! When VK hides a track URL it returns something like
//! `https://vk.com/mp3/audio_api_unavailable.mp3?extra=<data>#<ops>`.
//! Both halves are base64 with a shuffled alphabet. `<ops>` decodes to a
//! tab-separated list of transformations (`cmd` or `cmd\x0barg`) which,
//! applied last-to-first to `<data>`, produce the real URL:
//!
//! | cmd | argument | effect                                              |
//! |-----|----------|-----------------------------------------------------|
//! | `v` | —        | reverse                                             |
//! | `r` | shift    | rotate alphabet characters back by `shift`          |
//! | `x` | char     | XOR every character with the argument's first char  |
//! | `s` | seed     | seeded swap shuffle                                 |
//! | `i` | seed     | `s` with `seed ^ user_id`                           |

use crate::error::{Result, VkAudioError};

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZO123456789+/=";

/// Decode an `audio_api_unavailable` URL for the session user `user_id`.
pub fn decode_audio_url(url: &str, user_id: i64) -> Result<String> {
    let (_, extra) = url
        .split_once("?extra=")
        .ok_or_else(|| VkAudioError::Decode(format!("no extra in {url}")))?;
    let mut parts = extra.split('#');
    let data = parts.next().unwrap_or_default();
    let ops = parts
        .next()
        .ok_or_else(|| VkAudioError::Decode(format!("no ops in {url}")))?;

    let mut buf = decode_base(data);
    let ops: String = decode_base(ops).into_iter().collect();

    for op in ops.split('\t').rev() {
        let (cmd, arg) = match op.split_once('\x0b') {
            Some((cmd, arg)) => (cmd, Some(arg.split('\x0b').next().unwrap_or(arg))),
            None => (op, None),
        };
        match cmd {
            "v" => buf.reverse(),
            "r" => rotate(&mut buf, int_arg(cmd, arg)?),
            "x" => xor(&mut buf, arg.and_then(|a| a.chars().next()).ok_or_else(|| missing(cmd))?)?,
            "s" => shuffle(&mut buf, int_arg(cmd, arg)?),
            "i" => shuffle(&mut buf, int_arg(cmd, arg)? ^ user_id),
            other => {
                return Err(VkAudioError::Decode(format!("unknown decode cmd: {other:?}")));
            }
        }
    }

    Ok(buf.into_iter().collect())
}

fn missing(cmd: &str) -> VkAudioError {
    VkAudioError::Decode(format!("cmd {cmd:?} requires an argument"))
}

fn int_arg(cmd: &str, arg: Option<&str>) -> Result<i64> {
    let arg = arg.ok_or_else(|| missing(cmd))?;
    arg.trim()
        .parse()
        .map_err(|_| VkAudioError::Decode(format!("bad argument {arg:?} for cmd {cmd:?}")))
}

/// Base64 over [`ALPHABET`]; characters outside it are skipped.
#[allow(clippy::cast_possible_truncation)]
fn decode_base(s: &str) -> Vec<char> {
    let mut out = Vec::with_capacity(s.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut seen: i64 = 0;
    for c in s.chars() {
        let Some(idx) = ALPHABET.find(c) else { continue };
        let idx = idx as u32;
        if seen % 4 == 0 {
            acc = idx;
            seen += 1;
        } else {
            acc = (acc << 6) + idx;
            seen += 1;
            let shift = (-2 * seen) & 6;
            out.push(char::from(((acc >> shift) & 0xFF) as u8));
        }
    }
    out
}

fn rotate(buf: &mut [char], shift: i64) {
    let doubled: Vec<char> = ALPHABET.chars().chain(ALPHABET.chars()).collect();
    let len = i64::try_from(doubled.len()).unwrap_or(i64::MAX);
    for c in buf.iter_mut() {
        if let Some(idx) = doubled.iter().position(|d| d == c) {
            let idx = i64::try_from(idx).unwrap_or_default();
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let target = (idx - shift).rem_euclid(len) as usize;
            *c = doubled[target];
        }
    }
}

fn xor(buf: &mut [char], key: char) -> Result<()> {
    let key = u32::from(key);
    for c in buf.iter_mut() {
        *c = char::from_u32(u32::from(*c) ^ key)
            .ok_or_else(|| VkAudioError::Decode("xor produced an invalid char".into()))?;
    }
    Ok(())
}

/// Swap positions derived from `seed`. Shared by the `s` and `i` commands.
fn shuffle(buf: &mut [char], seed: i64) {
    let len = buf.len();
    if len == 0 {
        return;
    }
    let order = swap_order(len, seed);
    for a in 1..len {
        buf.swap(a, order[len - 1 - a]);
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn swap_order(len: usize, seed: i64) -> Vec<usize> {
    let n = i64::try_from(len).unwrap_or(i64::MAX);
    let mut e = seed;
    let mut order: Vec<usize> = (0..n)
        .rev()
        .map(|a| {
            e = ((n * (a + 1)) ^ e.wrapping_add(a)).rem_euclid(n);
            e as usize
        })
        .collect();
    order.reverse();
    order
}
