// Copyright (c) 2019 Jason White
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

use std::path::{Component, Path, PathBuf};

pub trait PathExt {
    /// Returns a lexically normalized path. This does not touch the file
    /// system at all.
    fn normalize(&self) -> PathBuf;

    /// Returns this path relative to the given base path, or `None` if the
    /// path cannot be expressed relative to the base.
    fn relative_from(&self, base: &Path) -> Option<PathBuf>;

    /// Renders the path with forward slashes regardless of platform.
    /// Resource names derived from paths must hash identically everywhere.
    fn to_slash(&self) -> String;
}

impl PathExt for Path {
    fn normalize(&self) -> PathBuf {
        let mut new_path = PathBuf::new();

        for c in self.components() {
            match c {
                Component::CurDir => {}
                Component::ParentDir => {
                    let pop = match new_path.components().next_back() {
                        Some(Component::Prefix(_))
                        | Some(Component::RootDir) => true,
                        Some(Component::Normal(s)) => !s.is_empty(),
                        _ => false,
                    };

                    if pop {
                        new_path.pop();
                    } else {
                        new_path.push("..");
                    }
                }
                _ => {
                    new_path.push(c.as_os_str());
                }
            };
        }

        if new_path.as_os_str().is_empty() {
            new_path.push(".");
        }

        new_path
    }

    fn relative_from(&self, base: &Path) -> Option<PathBuf> {
        let path = self.normalize();
        let base = base.normalize();

        if path.is_absolute() != base.is_absolute() {
            return None;
        }

        let mut ita = path.components();
        let mut itb = base.components();
        let mut comps: Vec<Component<'_>> = Vec::new();

        loop {
            match (ita.next(), itb.next()) {
                (None, None) => break,
                (Some(a), None) => {
                    comps.push(a);
                    comps.extend(ita.by_ref());
                    break;
                }
                (None, _) => comps.push(Component::ParentDir),
                (Some(a), Some(b)) if comps.is_empty() && a == b => (),
                (Some(a), Some(b)) if b == Component::CurDir => comps.push(a),
                (Some(_), Some(b)) if b == Component::ParentDir => {
                    return None;
                }
                (Some(a), Some(_)) => {
                    comps.push(Component::ParentDir);
                    for _ in itb.by_ref() {
                        comps.push(Component::ParentDir);
                    }
                    comps.push(a);
                    comps.extend(ita.by_ref());
                    break;
                }
            }
        }

        Some(comps.iter().map(|c| c.as_os_str()).collect())
    }

    fn to_slash(&self) -> String {
        let mut s = String::new();

        for c in self.components() {
            if !s.is_empty() {
                s.push('/');
            }

            s.push_str(&c.as_os_str().to_string_lossy());
        }

        s
    }
}
