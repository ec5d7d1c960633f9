// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository metadata primitives.

This crate defines pure Rust implementations for reading the metadata published by
Debian repositories: the `Release` / `InRelease` files describing a distribution and
the `Packages` indices describing binary packages. Debian repositories are what tools
like `apt` and `apt-get` consume on Debian-flavored Linux distributions like Debian
and Ubuntu.

# A Tour of Functionality

A common primitive within Debian packaging is *control files*. These consist of *paragraphs*
of key-value metadata. Low-level control file primitives are defined in the [control] module.
[control::ControlParagraph] defines a paragraph, which consists of [control::ControlField].
[control::ControlFile] provides an interface for a *control file*, which consists of multiple
paragraphs. [control::ControlParagraphReader] implements a streaming reader of control files
and [control::ControlParagraphAsyncReader] implements an asynchronous streaming reader.

[binary_package_control::PackageRecord] wraps a paragraph from a `Packages` file and
provides helper functions for resolving common fields, including the `Build-Ids` of debug
symbol packages. [binary_package_list::PackageIndex] holds every record of a `Packages`
file keyed by package name.

The [repository] module provides functionality related to Debian repositories.
[repository::Repository] discovers distributions, [repository::Release] resolves the
[repository::release::ReleaseDocument] of a distribution, and [repository::PackageList]
resolves a `Packages` index. Each of these fetches content lazily and at most once.

Content is obtained through the [io::DataResolver] trait. Implementations exist for
HTTP ([repository::http::HttpRepositoryClient], behind the `http` feature), the
filesystem ([repository::filesystem::FilesystemRepositoryReader]), and memory
([repository::memory::MemoryRepository]).

# Crate Features

The optional and enabled-by-default `http` feature enables HTTP client support for
interacting with Debian repositories via HTTP.

# Signatures

PGP signatures of `Release` files are retained but not verified.
*/

pub mod binary_package_control;
pub mod binary_package_list;
pub mod control;
pub mod error;
pub mod io;
pub mod repository;
