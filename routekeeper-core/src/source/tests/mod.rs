mod json_lines;
