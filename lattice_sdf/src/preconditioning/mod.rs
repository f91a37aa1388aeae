/////////////////////////////////////////////////////////////////////////////////////////////
//
// Groups the modules that implement coarse levels, tile decomposition, and Schwarz sweeps.
//
// Created on: 15 Nov 2025     Author: Daniel Owen 
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License. 
//
/////////////////////////////////////////////////////////////////////////////////////////////

pub mod coarse_level;
pub mod domain_decomposition;
pub mod schwarz;
